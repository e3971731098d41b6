//! ntfsmount-core: Core library for mounting NTFS volumes read-write on macOS.
//!
//! macOS mounts NTFS volumes read-only. This library finds those volumes via
//! `diskutil`, remounts them through ntfs-3g, and keeps a session model of
//! what is mounted that a status menu (or any other front-end) can render.
//!
//! # Modules
//!
//! - [`config`]: Configuration file and environment overrides
//! - [`directory`]: Volume discovery using `diskutil`
//! - [`environment`]: macFUSE and ntfs-3g detection
//! - [`executor`]: Command execution with optional sudo escalation
//! - [`mount`]: The unmount/mount/restore pipeline
//! - [`session`]: Session state machine
//! - [`projector`]: Session state to menu contents
//! - [`runtime`]: Worker dispatch and the event queue
//! - [`watcher`]: Mount table polling
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use ntfsmount_core::{Config, Diskutil, VolumeDirectory, mount};
//!
//! let config = Config::load().unwrap();
//! let volumes = Diskutil.list_volumes().unwrap();
//!
//! if let (Some(volume), Some(ntfs_3g)) = (volumes.first(), &config.ntfs_3g_path) {
//!     let executor = mount::Ntfs3gExecutor::new(ntfs_3g, None);
//!     let outcome = mount::mount_volume(&executor, volume, None, &config.mount_root, &mut ());
//!     println!("{:?}", outcome);
//! }
//! ```

pub mod config;
pub mod directory;
pub mod environment;
pub mod error;
pub mod executor;
pub mod mount;
pub mod projector;
pub mod runtime;
pub mod session;
pub mod volume;
pub mod watcher;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::Config;
pub use directory::{Diskutil, VolumeDirectory};
pub use environment::EnvironmentInfo;
pub use error::{Error, Result};
pub use mount::{MountExecutor, MountOutcome, Ntfs3gExecutor};
pub use projector::Projection;
pub use runtime::{EventSender, Render, Runtime};
pub use session::{Event, SessionController};
pub use volume::{Access, Volume};
pub use watcher::MountWatcher;
