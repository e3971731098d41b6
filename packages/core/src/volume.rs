//! NTFS volume model.
//!
//! A [`Volume`] is a value record: when anything about a volume changes the
//! whole record is replaced, it is never patched in place.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Placeholder used when the filesystem reports an empty label.
pub const UNTITLED_VOLUME_NAME: &str = "Untitled";

/// Write access of a volume as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// Mounted read-only, typically by the OS's own NTFS driver.
    ReadOnly,
    /// Mounted read-write.
    Writable,
    /// Not mounted.
    NotApplicable,
    /// Access could not be determined from diskutil output.
    Unknown,
}

/// One NTFS partition visible to the OS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Device identifier assigned by the OS (e.g., "disk4s1").
    pub id: String,
    /// Device node handed to the mount driver (e.g., "/dev/disk4s1").
    pub device_path: PathBuf,
    /// Display name.
    pub name: String,
    /// Current mount point, if mounted.
    pub mounted_path: Option<PathBuf>,
    /// Human-readable capacity (e.g., "64.0 GB").
    pub size_label: String,
    pub access: Access,
    /// Fixed/internal storage.
    pub is_internal: bool,
}

impl Volume {
    /// Returns true if this volume is currently mounted.
    pub fn is_mounted(&self) -> bool {
        self.mounted_path.is_some()
    }

    /// Returns true if this volume is mounted read-write.
    pub fn is_writable(&self) -> bool {
        self.access == Access::Writable
    }

    /// Returns true if the volume is mounted at `path`.
    pub fn is_mounted_at(&self, path: &Path) -> bool {
        self.mounted_path.as_deref() == Some(path)
    }

    /// Menu/listing label, e.g. "USB [64.0 GB]".
    pub fn label(&self) -> String {
        format!("{} [{}]", self.name, self.size_label)
    }

    /// Copy of this volume marked writable.
    pub fn into_writable(self) -> Self {
        Self {
            access: Access::Writable,
            ..self
        }
    }

    /// Copy of this volume with a new name and mount point.
    pub fn renamed(&self, name: impl Into<String>, mounted_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            mounted_path: Some(mounted_path.into()),
            ..self.clone()
        }
    }

    /// Copy of this volume as it looks after being unmounted.
    pub fn unmounted(&self) -> Self {
        Self {
            mounted_path: None,
            access: Access::NotApplicable,
            ..self.clone()
        }
    }
}

/// Inserts `volume` into `volumes`, replacing any record with the same id,
/// and keeps the list ordered by id.
pub fn upsert_volume(volumes: &mut Vec<Volume>, volume: Volume) {
    volumes.retain(|v| v.id != volume.id);
    volumes.push(volume);
    sort_volumes(volumes);
}

/// Removes the record with `id`, returning it if present.
pub fn remove_volume(volumes: &mut Vec<Volume>, id: &str) -> Option<Volume> {
    let index = volumes.iter().position(|v| v.id == id)?;
    Some(volumes.remove(index))
}

/// Sorts volumes by id.
pub fn sort_volumes(volumes: &mut [Volume]) {
    volumes.sort_by(|a, b| a.id.cmp(&b.id));
}
