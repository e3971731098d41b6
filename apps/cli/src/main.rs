//! ntfsmount CLI - Command line interface for one-shot mount operations.
//!
//! Lists NTFS volumes and remounts them read-write via ntfs-3g without the
//! status menu. Mounting needs root or password-less sudo for ntfs-3g.

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use nix::unistd::geteuid;
use ntfsmount_core::environment::{self, EnvironmentInfo};
use ntfsmount_core::mount::{self, MountOutcome, MountProgress};
use ntfsmount_core::{Access, Config, Diskutil, Ntfs3gExecutor, Volume, VolumeDirectory};

/// ntfsmount CLI tool.
#[derive(Parser)]
#[command(name = "ntfsmount")]
#[command(about = "Mount NTFS volumes read-write via ntfs-3g", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all NTFS volumes available for mounting.
    List {
        /// Print the volumes as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Mount all NTFS volumes via ntfs-3g.
    All,
    /// Mount a specific NTFS volume via ntfs-3g.
    Mount {
        /// Disk identifier (e.g. disk4s1), device node or mount point.
        id: String,
        /// Mount point to use instead of a generated one.
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show what the environment check finds.
    Env,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("ntfsmount: {}", e);
            std::process::exit(1);
        }
    }
}

/// Runs one command. `Ok(false)` means it ran but did not succeed.
fn run(cli: Cli) -> Result<bool, Box<dyn Error>> {
    let config = Config::load()?;

    match cli.command {
        Commands::List { json } => {
            let volumes = Diskutil.list_volumes()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&volumes)?);
            } else {
                print_volumes(&volumes);
            }
            Ok(true)
        }
        Commands::All => {
            let executor = run_checks(&config)?;
            let volumes = Diskutil.list_volumes()?;
            println!("Found {} NTFS volume(s).", volumes.len());

            let mut ok = true;
            for volume in &volumes {
                println!();
                ok &= mount_one(&executor, volume, None, &config.mount_root);
            }
            Ok(ok)
        }
        Commands::Mount { id, path } => {
            let executor = run_checks(&config)?;
            let Some(volume) = Diskutil.resolve_volume(&id)? else {
                eprintln!("ntfsmount: Invalid disk id: {}", id);
                return Ok(false);
            };
            Ok(mount_one(
                &executor,
                &volume,
                path.as_deref(),
                &config.mount_root,
            ))
        }
        Commands::Env => {
            let info = environment::detect(&config)?;
            print_environment(&info);
            Ok(info.failure().is_none())
        }
    }
}

fn print_volumes(volumes: &[Volume]) {
    if volumes.is_empty() {
        println!("No NTFS volumes found.");
    }

    for volume in volumes {
        let read_only = if volume.access == Access::ReadOnly {
            " (read-only)"
        } else {
            ""
        };
        println!(
            "{}: {} -- mounted: {}{}",
            volume.id,
            volume.label(),
            if volume.is_mounted() { "yes" } else { "no" },
            read_only
        );
    }
}

fn print_environment(info: &EnvironmentInfo) {
    match &info.fuse {
        Some(bundle) => println!("macFUSE: {}", bundle.display()),
        None => println!("macFUSE: not found"),
    }
    match (&info.ntfs_3g_path, info.ntfs_3g) {
        (Some(path), Some(version)) => println!("ntfs-3g: {} ({})", path.display(), version),
        (Some(path), None) => println!("ntfs-3g: {} (unrecognized version)", path.display()),
        (None, _) => println!("ntfs-3g: not found"),
    }
    println!("sudo: {}", if info.can_mount { "yes" } else { "no" });

    if let Some(message) = info.failure() {
        println!();
        println!("{}", message);
    }
}

/// Verifies that mounting can work and builds the executor for it.
fn run_checks(config: &Config) -> Result<Ntfs3gExecutor, Box<dyn Error>> {
    let path = config.require_ntfs_3g()?;
    let info = environment::detect(config)?;

    let Some(version) = info.ntfs_3g else {
        return Err(format!("ERROR: Could not run ntfs-3g at {}.", path.display()).into());
    };
    if info.fuse.is_none() {
        return Err("ERROR: Could not find macFUSE.".into());
    }
    if !geteuid().is_root() && !info.can_mount {
        return Err("ERROR: Need root privileges to mount via ntfs-3g.".into());
    }

    Ok(Ntfs3gExecutor::new(path, Some(version)))
}

/// Prints progress lines as the mount pipeline runs.
struct PrintProgress;

impl MountProgress for PrintProgress {
    fn unmounting(&mut self, _volume: &Volume) {
        println!("Unmounting...");
    }

    fn mounting(&mut self, _volume: &Volume, destination: &Path) {
        println!("Mounting on `{}` via ntfs-3g...", destination.display());
    }

    fn restoring(&mut self, _volume: &Volume) {
        println!("Remounting via macOS...");
    }
}

fn mount_one(
    executor: &Ntfs3gExecutor,
    volume: &Volume,
    destination: Option<&Path>,
    mount_root: &Path,
) -> bool {
    println!("Volume: {}", volume.label());

    let outcome = mount::mount_volume(
        executor,
        volume,
        destination,
        mount_root,
        &mut PrintProgress,
    );
    let ok = outcome.is_success();

    match outcome {
        MountOutcome::AlreadyWritable => {
            println!("{} is already writable.", volume.name);
        }
        MountOutcome::Mounted { .. } => {
            println!("Successfully mounted {}.", volume.name);
        }
        MountOutcome::UnmountFailed { message } => {
            println!("Failed to unmount {}.", volume.name);
            eprintln!("{}", message);
        }
        MountOutcome::MountFailed { message, restored } => {
            println!("Failed to mount {}.", volume.name);
            eprintln!("{}", message);
            if restored == Some(false) {
                eprintln!("{} could not be remounted and is left unmounted.", volume.name);
            }
        }
    }

    ok
}
