//! Mount operations module.
//!
//! This module holds the mount driver invocation (ntfs-3g), the native
//! unmount/remount calls (diskutil), and the single-volume mount pipeline
//! that ties them together.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::environment::NtfsVersion;
use crate::error::Result;
use crate::executor::{self, ExecutionContext};
use crate::volume::Volume;

/// Operations the mount pipeline needs from the system.
pub trait MountExecutor: Send + Sync {
    /// Unmounts a volume mounted by the OS's own driver.
    fn unmount_native(&self, volume: &Volume) -> Result<()>;

    /// Mounts a volume with the OS's own (read-only) driver.
    fn mount_native(&self, volume: &Volume) -> Result<()>;

    /// Mounts a volume read-write with the third-party driver at `destination`.
    fn mount(&self, volume: &Volume, destination: &Path) -> Result<()>;
}

/// [`MountExecutor`] using `diskutil` and ntfs-3g.
#[derive(Debug, Clone)]
pub struct Ntfs3gExecutor {
    ntfs_3g_path: PathBuf,
    version: Option<NtfsVersion>,
    ctx: ExecutionContext,
    owner: MountOwner,
}

impl Ntfs3gExecutor {
    pub fn new(ntfs_3g_path: impl Into<PathBuf>, version: Option<NtfsVersion>) -> Self {
        Self {
            ntfs_3g_path: ntfs_3g_path.into(),
            version,
            ctx: ExecutionContext::for_current_user(),
            owner: MountOwner::invoking_user(),
        }
    }

    /// The ntfs-3g argv for mounting `volume` at `destination`, without any
    /// privilege wrapper.
    pub fn mount_command(&self, volume: &Volume, destination: &Path) -> Vec<OsString> {
        build_mount_command(
            &self.ntfs_3g_path,
            volume,
            self.version,
            self.owner,
            destination,
        )
    }
}

impl MountExecutor for Ntfs3gExecutor {
    fn unmount_native(&self, volume: &Volume) -> Result<()> {
        executor::run_checked("diskutil", &["unmount", &volume.id])
    }

    fn mount_native(&self, volume: &Volume) -> Result<()> {
        executor::run_checked("diskutil", &["mount", &volume.id])
    }

    fn mount(&self, volume: &Volume, destination: &Path) -> Result<()> {
        let command = self.mount_command(volume, destination);
        let args: Vec<String> = command[1..]
            .iter()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        self.ctx
            .run_privileged_checked(&self.ntfs_3g_path.to_string_lossy(), &args)
    }
}

/// uid/gid that will own files on the mounted volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MountOwner {
    pub uid: u32,
    pub gid: u32,
}

impl MountOwner {
    /// The user who invoked `sudo` if any, otherwise the current process.
    pub fn invoking_user() -> Self {
        let from_env = |key: &str| std::env::var(key).ok().and_then(|v| v.parse().ok());
        Self {
            uid: from_env("SUDO_UID").unwrap_or_else(|| nix::unistd::getuid().as_raw()),
            gid: from_env("SUDO_GID").unwrap_or_else(|| nix::unistd::getgid().as_raw()),
        }
    }
}

/// Builds the ntfs-3g command line.
pub fn build_mount_command(
    ntfs_3g_path: &Path,
    volume: &Volume,
    version: Option<NtfsVersion>,
    owner: MountOwner,
    destination: &Path,
) -> Vec<OsString> {
    let xattr_option = match version {
        Some(version) if version.supports_user_xattr() => "user_xattr",
        _ => "auto_xattr",
    };

    let options = [
        format!("volname={}", volume.name),
        "local".to_string(),
        "allow_other".to_string(),
        xattr_option.to_string(),
        format!("uid={}", owner.uid),
        format!("gid={}", owner.gid),
        "windows_names".to_string(),
    ];

    let mut command = vec![ntfs_3g_path.as_os_str().to_os_string()];
    for option in options {
        command.push("-o".into());
        command.push(option.into());
    }
    command.push(volume.device_path.as_os_str().to_os_string());
    command.push(destination.as_os_str().to_os_string());
    command
}

/// Picks a free mount point: `<root>/<name>`, then `<root>/<name> 1`,
/// `<root>/<name> 2`, and so on.
pub fn generate_mount_path(mount_root: &Path, name: &str) -> PathBuf {
    let base = mount_root.join(name);
    if !base.exists() {
        return base;
    }

    (1..)
        .map(|counter| mount_root.join(format!("{} {}", name, counter)))
        .find(|path| !path.exists())
        .unwrap_or(base)
}

/// Result of one run of [`mount_volume`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountOutcome {
    /// Volume was already writable; nothing was invoked.
    AlreadyWritable,
    /// Mounted read-write at the given path.
    Mounted { path: PathBuf },
    /// The native unmount failed, so the driver was never invoked.
    UnmountFailed { message: String },
    /// The driver failed.
    MountFailed {
        message: String,
        /// Whether a native remount was attempted and succeeded. `None` when
        /// the volume was not mounted beforehand.
        restored: Option<bool>,
    },
}

impl MountOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::AlreadyWritable | Self::Mounted { .. })
    }
}

/// Receives progress while [`mount_volume`] runs. The CLI prints these; the
/// background worker ignores them.
pub trait MountProgress {
    fn unmounting(&mut self, _volume: &Volume) {}
    fn mounting(&mut self, _volume: &Volume, _destination: &Path) {}
    fn restoring(&mut self, _volume: &Volume) {}
}

impl MountProgress for () {}

/// Makes `volume` writable.
///
/// Unmounts a native read-only mount first, then runs the driver at
/// `destination` (or a generated path under `mount_root`). If the driver
/// fails after an unmount, the native mount is restored on a best-effort
/// basis. Never touches shared state; the caller acts on the outcome.
pub fn mount_volume(
    executor: &dyn MountExecutor,
    volume: &Volume,
    destination: Option<&Path>,
    mount_root: &Path,
    progress: &mut dyn MountProgress,
) -> MountOutcome {
    if volume.is_writable() {
        info!(volume = %volume.id, "already writable");
        return MountOutcome::AlreadyWritable;
    }

    let was_mounted = volume.is_mounted();
    if was_mounted {
        progress.unmounting(volume);
        if let Err(e) = executor.unmount_native(volume) {
            warn!(volume = %volume.id, error = %e, "native unmount failed");
            return MountOutcome::UnmountFailed {
                message: e.to_string(),
            };
        }
    }

    let destination = destination
        .map(Path::to_path_buf)
        .unwrap_or_else(|| generate_mount_path(mount_root, &volume.name));

    progress.mounting(volume, &destination);
    match executor.mount(volume, &destination) {
        Ok(()) => {
            info!(volume = %volume.id, path = %destination.display(), "mounted read-write");
            MountOutcome::Mounted { path: destination }
        }
        Err(e) => {
            warn!(volume = %volume.id, error = %e, "ntfs-3g mount failed");
            let restored = was_mounted.then(|| restore_native_mount(executor, volume, progress));
            MountOutcome::MountFailed {
                message: e.to_string(),
                restored,
            }
        }
    }
}

fn restore_native_mount(
    executor: &dyn MountExecutor,
    volume: &Volume,
    progress: &mut dyn MountProgress,
) -> bool {
    progress.restoring(volume);
    match executor.mount_native(volume) {
        Ok(()) => true,
        Err(e) => {
            error!(
                volume = %volume.id,
                error = %e,
                "failed to restore native mount, volume may be left unmounted"
            );
            false
        }
    }
}
