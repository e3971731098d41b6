//! Environment probe: mount extension, ntfs-3g and sudo privileges.
//!
//! Any failure here is an environment defect. Hosts report it to the session
//! controller, which stays in its hard-failed state until restarted or reset.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use crate::executor::{self, ExecutionContext};

/// ntfs-3g release that introduced the `user_xattr` mount option.
pub const USER_XATTR_MIN_VERSION: NtfsVersion = NtfsVersion {
    year: 2017,
    month: 3,
    day: 23,
    ar: 6,
};

/// Message shown when the probe itself could not run.
pub const PROBE_FAILED_MESSAGE: &str = "Failed to detect the environment";

/// ntfs-3g version, e.g. `2017.3.23AR.6`. Orders by release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct NtfsVersion {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    /// Tuxera "AR" release number, 0 when absent.
    pub ar: u32,
}

impl NtfsVersion {
    /// Parses `ntfs-3g --version` output such as
    /// `ntfs-3g 2017.3.23AR.6 external FUSE 29`.
    pub fn parse(output: &str) -> Option<Self> {
        let rest = output.trim().strip_prefix("ntfs-3g ")?;
        let (release, rest) = rest.split_once(' ')?;
        if !rest.starts_with("external FUSE ") {
            return None;
        }

        let (date, ar) = match release.split_once("AR.") {
            Some((date, ar)) => (date, ar.parse().ok()?),
            None => (release, 0),
        };

        let mut parts = date.split('.').map(|part| part.parse::<u32>());
        let (Some(Ok(year)), Some(Ok(month)), Some(Ok(day)), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return None;
        };

        Some(Self {
            year,
            month,
            day,
            ar,
        })
    }

    /// Returns true if this release understands `-o user_xattr`.
    pub fn supports_user_xattr(&self) -> bool {
        *self >= USER_XATTR_MIN_VERSION
    }
}

impl fmt::Display for NtfsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.year, self.month, self.day)?;
        if self.ar > 0 {
            write!(f, "AR.{}", self.ar)?;
        }
        Ok(())
    }
}

/// What the probe found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentInfo {
    /// Installed mount extension bundle, if any.
    pub fuse: Option<PathBuf>,
    /// Path of the ntfs-3g binary that was probed.
    pub ntfs_3g_path: Option<PathBuf>,
    pub ntfs_3g: Option<NtfsVersion>,
    /// ntfs-3g can be run through `sudo --non-interactive`.
    pub can_mount: bool,
}

impl EnvironmentInfo {
    /// The environment defect to report, if any.
    pub fn failure(&self) -> Option<&'static str> {
        if self.fuse.is_none() {
            Some("Failed to detect macFUSE")
        } else if self.ntfs_3g.is_none() {
            Some("Failed to detect ntfs-3g")
        } else if !self.can_mount {
            Some("Missing privileges to mount via ntfs-3g")
        } else {
            None
        }
    }
}

/// Probes the machine as described by `config`.
pub fn detect(config: &Config) -> Result<EnvironmentInfo> {
    let fuse = detect_fuse(&config.fuse_bundles);
    let ntfs_3g_path = config.ntfs_3g_path.clone();

    let ntfs_3g = match &ntfs_3g_path {
        Some(path) => ntfs_3g_version(path)?,
        None => None,
    };

    let can_mount = match (&fuse, ntfs_3g, &ntfs_3g_path) {
        (Some(_), Some(_), Some(path)) => ExecutionContext::with_sudo()
            .run_privileged(&path.to_string_lossy(), &["--version"])?
            .status
            .success(),
        _ => false,
    };

    let info = EnvironmentInfo {
        fuse,
        ntfs_3g_path,
        ntfs_3g,
        can_mount,
    };
    debug!(?info, "environment probed");
    Ok(info)
}

/// Runs the probe and reduces it to the message the controller needs.
pub fn check(config: &Config) -> std::result::Result<EnvironmentInfo, String> {
    match detect(config) {
        Ok(info) => match info.failure() {
            Some(message) => Err(message.to_string()),
            None => Ok(info),
        },
        Err(e) => {
            tracing::error!(error = %e, "environment probe failed");
            Err(PROBE_FAILED_MESSAGE.to_string())
        }
    }
}

fn detect_fuse(bundles: &[PathBuf]) -> Option<PathBuf> {
    bundles.iter().find(|bundle| bundle.exists()).cloned()
}

/// ntfs-3g prints its version to stderr.
fn ntfs_3g_version(path: &Path) -> Result<Option<NtfsVersion>> {
    let output = executor::run_command(&path.to_string_lossy(), &["--version"])?;
    if !output.status.success() {
        return Ok(None);
    }
    Ok(NtfsVersion::parse(&String::from_utf8_lossy(&output.stderr)))
}
