//! Mount table watcher: the source of attach, detach and rename events.
//!
//! Polls `mount` and diffs consecutive snapshots keyed by mount source, so a
//! device that moves to a new mount point is reported as a rename rather than
//! a detach followed by an attach.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use snafu::ResultExt;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, WorkerSpawnSnafu};
use crate::executor;
use crate::runtime::EventSender;
use crate::session::Event;

/// Mount source to mount point, for mounts under the watched root.
pub type MountTable = BTreeMap<String, PathBuf>;

/// Parses `mount` output lines such as
/// `/dev/disk4s1 on /Volumes/USB (ntfs, local, read-only)`.
///
/// Only device-backed mounts under `mount_root` are kept.
pub fn parse_mount_table(output: &str, mount_root: &Path) -> MountTable {
    output
        .lines()
        .filter_map(parse_mount_line)
        .filter(|(source, path)| source.starts_with("/dev/") && path.starts_with(mount_root))
        .collect()
}

fn parse_mount_line(line: &str) -> Option<(String, PathBuf)> {
    let (source, rest) = line.split_once(" on ")?;
    // Mount points may contain " (" themselves; options start at the last.
    let (path, _options) = rest.rsplit_once(" (")?;
    Some((source.to_string(), PathBuf::from(path)))
}

/// Events that turn `old` into `new`.
pub fn diff_mount_tables(old: &MountTable, new: &MountTable) -> Vec<Event> {
    let mut events = Vec::new();

    for (source, old_path) in old {
        match new.get(source) {
            None => events.push(Event::VolumeDetached {
                path: old_path.clone(),
            }),
            Some(new_path) if new_path != old_path => events.push(Event::VolumeRenamed {
                old_path: old_path.clone(),
                new_name: mount_name(new_path),
                new_path: new_path.clone(),
            }),
            Some(_) => {}
        }
    }

    for (source, path) in new {
        if !old.contains_key(source) {
            events.push(Event::VolumeAttached { path: path.clone() });
        }
    }

    events
}

fn mount_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn read_mount_table(mount_root: &Path) -> Result<MountTable> {
    let output = executor::capture_stdout("mount", &[])?;
    Ok(parse_mount_table(&output, mount_root))
}

/// Background thread that polls the mount table.
pub struct MountWatcher {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl MountWatcher {
    /// Starts polling. The thread exits on [`MountWatcher::stop`] or once the
    /// runtime behind `sender` is gone.
    pub fn spawn(sender: EventSender, config: &Config) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let mount_root = config.mount_root.clone();
        let interval = Duration::from_millis(config.poll_interval_ms.max(1));

        let handle = thread::Builder::new()
            .name("ntfsmount-watcher".to_string())
            .spawn(move || poll(sender, &mount_root, interval, &flag))
            .context(WorkerSpawnSnafu { task: "watcher" })?;

        info!(interval_ms = interval.as_millis() as u64, "mount watcher started");
        Ok(Self { stop, handle })
    }

    /// Asks the thread to exit and waits for it.
    pub fn stop(self) {
        self.stop.store(true, Ordering::SeqCst);
        if self.handle.join().is_err() {
            warn!("mount watcher thread panicked");
        }
    }
}

fn poll(sender: EventSender, mount_root: &Path, interval: Duration, stop: &AtomicBool) {
    // The first snapshot is the baseline; the initial reload covers it.
    let mut previous = read_mount_table(mount_root).unwrap_or_else(|e| {
        warn!(error = %e, "failed to read mount table");
        MountTable::new()
    });

    while !stop.load(Ordering::SeqCst) {
        thread::sleep(interval);

        let current = match read_mount_table(mount_root) {
            Ok(table) => table,
            Err(e) => {
                warn!(error = %e, "failed to read mount table");
                continue;
            }
        };

        for event in diff_mount_tables(&previous, &current) {
            debug!(?event, "mount table changed");
            if !sender.send(event) {
                debug!("event receiver gone, stopping watcher");
                return;
            }
        }
        previous = current;
    }
}
