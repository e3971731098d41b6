//! Runtime configuration.
//!
//! Values are layered: built-in defaults, then the optional JSON file at
//! `<config_dir>/ntfsmount/config.json`, then environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};

use crate::error::{ConfigParseSnafu, IoResultExt, Ntfs3gNotFoundSnafu, Result};

/// Directory name under the platform config dir.
pub const CONFIG_DIR_NAME: &str = "ntfsmount";

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Default parent directory for generated mount points.
pub const DEFAULT_MOUNT_ROOT: &str = "/Volumes";

/// Default mount table polling period.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// Mount extension bundles probed by the environment check, in order.
pub const DEFAULT_FUSE_BUNDLES: [&str; 2] = [
    "/Library/Filesystems/macfuse.fs",
    "/Library/Filesystems/osxfuse.fs",
];

pub const ENV_NTFS_3G_PATH: &str = "NTFS_3G_PATH";
pub const ENV_MOUNT_ROOT: &str = "NTFSMOUNT_MOUNT_ROOT";
pub const ENV_ALWAYS_SHOW: &str = "NTFSMOUNT_ALWAYS_SHOW";
pub const ENV_POLL_INTERVAL_MS: &str = "NTFSMOUNT_POLL_INTERVAL_MS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// ntfs-3g binary. Looked up on `PATH` when unset.
    pub ntfs_3g_path: Option<PathBuf>,
    /// Parent directory for generated mount points.
    pub mount_root: PathBuf,
    /// Show the menu even when there is nothing to show.
    pub always_show: bool,
    /// Mount table polling period for the watcher.
    pub poll_interval_ms: u64,
    pub fuse_bundles: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ntfs_3g_path: None,
            mount_root: PathBuf::from(DEFAULT_MOUNT_ROOT),
            always_show: false,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            fuse_bundles: DEFAULT_FUSE_BUNDLES.iter().map(PathBuf::from).collect(),
        }
    }
}

impl Config {
    /// Loads the full configuration for this process.
    pub fn load() -> Result<Self> {
        let mut config = match default_config_path() {
            Some(path) => Self::from_file_or_default(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.resolve_ntfs_3g();
        Ok(config)
    }

    /// Reads `path`, falling back to defaults when it does not exist.
    pub fn from_file_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).config_read_context(path)?;
        serde_json::from_str(&content).context(ConfigParseSnafu { path })
    }

    /// Applies environment-style overrides, `lookup` returning the value of
    /// a variable if set.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_NTFS_3G_PATH).filter(|p| !p.is_empty()) {
            self.ntfs_3g_path = Some(PathBuf::from(path));
        }
        if let Some(root) = lookup(ENV_MOUNT_ROOT).filter(|r| !r.is_empty()) {
            self.mount_root = PathBuf::from(root);
        }
        if let Some(flag) = lookup(ENV_ALWAYS_SHOW) {
            self.always_show = flag == "yes";
        }
        if let Some(interval) = lookup(ENV_POLL_INTERVAL_MS).and_then(|i| i.parse().ok()) {
            self.poll_interval_ms = interval;
        }
    }

    /// Fills in `ntfs_3g_path` from `PATH` when it was not configured.
    pub fn resolve_ntfs_3g(&mut self) {
        if self.ntfs_3g_path.is_none() {
            self.ntfs_3g_path = which::which("ntfs-3g").ok();
        }
    }

    /// The ntfs-3g binary, or an error if none was configured or found.
    pub fn require_ntfs_3g(&self) -> Result<&Path> {
        self.ntfs_3g_path.as_deref().context(Ntfs3gNotFoundSnafu)
    }
}

/// `<config_dir>/ntfsmount/config.json`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}
