//! Volume directory backed by `diskutil`.
//!
//! `diskutil list` names partitions by their *partition type*, which does not
//! always match the filesystem inside: a `Windows_NTFS` (MBR) or
//! `Microsoft Basic Data` (GPT) partition may hold exFAT, and a disk without
//! a partition table has no type at all. The list is therefore only used to
//! pick candidates, and `diskutil info` decides whether each one is NTFS.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use tracing::debug;

use crate::error::{Error, Result};
use crate::executor;
use crate::volume::{Access, UNTITLED_VOLUME_NAME, Volume};

/// Source of NTFS volume records.
pub trait VolumeDirectory: Send + Sync {
    /// Full scan of all NTFS volumes, ordered by id.
    fn list_volumes(&self) -> Result<Vec<Volume>>;

    /// Targeted lookup by device identifier, device node or mount point.
    ///
    /// Returns `Ok(None)` when the target exists but is not a usable NTFS
    /// volume.
    fn resolve_volume(&self, id_or_path: &str) -> Result<Option<Volume>>;
}

/// [`VolumeDirectory`] that shells out to macOS `diskutil`.
#[derive(Debug, Clone, Default)]
pub struct Diskutil;

impl VolumeDirectory for Diskutil {
    fn list_volumes(&self) -> Result<Vec<Volume>> {
        let output = executor::capture_stdout("diskutil", &["list"])?;
        let candidates = parse_disk_list(&output)?;
        debug!(?candidates, "NTFS candidates from diskutil list");

        let mut volumes = BTreeMap::new();
        for id in candidates {
            if let Some(volume) = self.resolve_volume(&id)? {
                volumes.insert(volume.id.clone(), volume);
            }
        }

        Ok(volumes.into_values().collect())
    }

    fn resolve_volume(&self, id_or_path: &str) -> Result<Option<Volume>> {
        let output = executor::capture_stdout("diskutil", &["info", id_or_path])?;
        parse_disk_info(id_or_path, &output)
    }
}

/// Extracts candidate device identifiers from `diskutil list` output.
pub fn parse_disk_list(output: &str) -> Result<Vec<String>> {
    let type_end = output
        .lines()
        .find_map(header_type_end)
        .ok_or_else(|| Error::DiskListParse {
            message: "no '#: TYPE' header row".to_string(),
        })?;

    let ids = output
        .lines()
        .filter(|line| {
            let Some((index, rest)) = split_row(line) else {
                return false;
            };
            let rest = rest.trim_start();
            let ntfs_type =
                rest.starts_with("Windows_NTFS ") || rest.starts_with("Microsoft Basic Data ");
            // Whole disk without a partition table: its TYPE column is blank.
            let bare_disk = index == 0 && line.as_bytes().get(type_end) == Some(&b' ');
            ntfs_type || bare_disk
        })
        .filter_map(|line| line.split_whitespace().last())
        .map(str::to_string)
        .collect();

    Ok(ids)
}

/// Column of the last character of `TYPE` in a header row.
fn header_type_end(line: &str) -> Option<usize> {
    let rest = line.trim_start().strip_prefix("#:")?;
    if !rest.trim_start().starts_with("TYPE") {
        return None;
    }
    line.find("TYPE").map(|start| start + "TYPE".len() - 1)
}

/// Splits a partition row ("   1:  Windows_NTFS ...") into index and remainder.
fn split_row(line: &str) -> Option<(u32, &str)> {
    let (index, rest) = line.trim_start().split_once(':')?;
    let index = index.parse().ok()?;
    Some((index, rest))
}

/// Builds a [`Volume`] from `diskutil info` output.
///
/// Returns `Ok(None)` for anything that is not a writable-media NTFS volume.
pub fn parse_disk_info(target: &str, output: &str) -> Result<Option<Volume>> {
    let info: HashMap<&str, &str> = output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim(), value.trim()))
        .collect();

    let is_ntfs = info.get("Type (Bundle)") == Some(&"ntfs")
        && info.get("File System Personality") == Some(&"NTFS");
    // Older versions of diskutil used the label "Read-Only Media".
    let read_only_media = info
        .get("Media Read-Only")
        .or_else(|| info.get("Read-Only Media"))
        == Some(&"Yes");
    if !is_ntfs || read_only_media {
        return Ok(None);
    }

    let field = |name: &str| {
        info.get(name).copied().ok_or_else(|| Error::DiskInfoField {
            target: target.to_string(),
            field: name.to_string(),
        })
    };

    let name = match field("Volume Name")? {
        "" => UNTITLED_VOLUME_NAME.to_string(),
        name => name.to_string(),
    };

    let mounted_path = match (field("Mounted")?, info.get("Mount Point")) {
        ("Yes", Some(path)) if !path.is_empty() => Some(PathBuf::from(path)),
        _ => None,
    };

    // Older versions of diskutil used the label "Read-Only Volume".
    let access = info
        .get("Volume Read-Only")
        .or_else(|| info.get("Read-Only Volume"))
        .map(|value| parse_access(value))
        .unwrap_or(Access::Unknown);

    Ok(Some(Volume {
        id: field("Device Identifier")?.to_string(),
        device_path: PathBuf::from(field("Device Node")?),
        name,
        mounted_path,
        size_label: size_label(field("Disk Size")?),
        access,
        is_internal: field("Device Location")? == "Internal",
    }))
}

/// Maps a read-only field such as "Yes (read-only mount flag set)".
fn parse_access(value: &str) -> Access {
    let value = match value.find(" (") {
        Some(note) if value.ends_with(')') => &value[..note],
        _ => value,
    };

    match value.trim() {
        "Yes" => Access::ReadOnly,
        "No" => Access::Writable,
        "Not applicable" => Access::NotApplicable,
        _ => Access::Unknown,
    }
}

/// "64.0 GB (64023257088 Bytes) (exactly ...)" -> "64.0 GB"
fn size_label(value: &str) -> String {
    let mut tokens = value.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some(amount), Some(unit)) if amount.parse::<f64>().is_ok() => {
            format!("{} {}", amount, unit)
        }
        _ => value.to_string(),
    }
}
