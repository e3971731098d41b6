//! Command execution abstraction with privilege escalation support.
//!
//! Commands that need root (the ntfs-3g driver) are wrapped in
//! `sudo --non-interactive`, which only succeeds when sudoers grants the
//! binary without a password. A prompt would block a background worker
//! forever, so interactive escalation is never attempted.

use std::process::{Command, Output};

use crate::error::{Error, IoResultExt, Result};

/// Privilege escalation method for executing commands that require root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrivilegeEscalation {
    /// Execute directly without privilege escalation.
    #[default]
    None,
    /// Use `sudo --non-interactive`.
    Sudo,
}

/// Execution context for running system commands.
///
/// # Example
///
/// ```
/// use ntfsmount_core::executor::{ExecutionContext, PrivilegeEscalation};
///
/// // Already running as root
/// let ctx = ExecutionContext::default();
/// assert_eq!(ctx.escalation(), PrivilegeEscalation::None);
///
/// // Regular user with a NOPASSWD sudoers entry for ntfs-3g
/// let sudo_ctx = ExecutionContext::with_sudo();
/// assert_eq!(sudo_ctx.escalation(), PrivilegeEscalation::Sudo);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    escalation: PrivilegeEscalation,
}

impl ExecutionContext {
    /// Creates a new execution context with no privilege escalation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an execution context that uses non-interactive `sudo`.
    pub fn with_sudo() -> Self {
        Self {
            escalation: PrivilegeEscalation::Sudo,
        }
    }

    /// Picks `None` when the process already runs as root, `Sudo` otherwise.
    pub fn for_current_user() -> Self {
        if nix::unistd::geteuid().is_root() {
            Self::new()
        } else {
            Self::with_sudo()
        }
    }

    /// Returns the current privilege escalation method.
    pub fn escalation(&self) -> PrivilegeEscalation {
        self.escalation
    }

    /// Builds the argv that [`run_privileged`](Self::run_privileged) executes.
    pub fn privileged_argv(&self, cmd: &str, args: &[&str]) -> Vec<String> {
        let mut argv = match self.escalation {
            PrivilegeEscalation::None => Vec::new(),
            PrivilegeEscalation::Sudo => vec!["sudo".to_string(), "--non-interactive".to_string()],
        };
        argv.push(cmd.to_string());
        argv.extend(args.iter().map(|a| a.to_string()));
        argv
    }

    /// Executes a command that requires root privileges.
    pub fn run_privileged(&self, cmd: &str, args: &[&str]) -> Result<Output> {
        let argv = self.privileged_argv(cmd, args);
        Command::new(&argv[0])
            .args(&argv[1..])
            .output()
            .command_context(argv.join(" "))
    }

    /// Executes a command that requires root privileges, checking for success.
    pub fn run_privileged_checked(&self, cmd: &str, args: &[&str]) -> Result<()> {
        let output = self.run_privileged(cmd, args)?;
        check_status(cmd, &output)
    }
}

/// Runs a command directly and returns its raw output.
pub fn run_command(cmd: &str, args: &[&str]) -> Result<Output> {
    Command::new(cmd)
        .args(args)
        .output()
        .command_context(cmd)
}

/// Runs a command directly, failing on non-zero exit.
pub fn run_checked(cmd: &str, args: &[&str]) -> Result<()> {
    let output = run_command(cmd, args)?;
    check_status(cmd, &output)
}

/// Runs a command directly and returns its stdout, failing on non-zero exit.
pub fn capture_stdout(cmd: &str, args: &[&str]) -> Result<String> {
    let output = run_command(cmd, args)?;
    check_status(cmd, &output)?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

fn check_status(cmd: &str, output: &Output) -> Result<()> {
    if !output.status.success() {
        return Err(Error::CommandExit {
            command: cmd.to_string(),
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}
