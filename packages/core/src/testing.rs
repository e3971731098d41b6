//! Fakes shared by the unit tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::directory::VolumeDirectory;
use crate::error::{Error, Result};
use crate::mount::MountExecutor;
use crate::volume::{Access, Volume};

/// Unmounted removable volume.
pub fn sample_volume(id: &str, name: &str) -> Volume {
    Volume {
        id: id.to_string(),
        device_path: PathBuf::from(format!("/dev/{}", id)),
        name: name.to_string(),
        mounted_path: None,
        size_label: "64.0 GB".to_string(),
        access: Access::NotApplicable,
        is_internal: false,
    }
}

/// Volume mounted read-only at `/Volumes/<name>`.
pub fn mounted(id: &str, name: &str) -> Volume {
    Volume {
        mounted_path: Some(PathBuf::from(format!("/Volumes/{}", name))),
        access: Access::ReadOnly,
        ..sample_volume(id, name)
    }
}

pub fn scripted_error() -> Error {
    Error::CommandExit {
        command: "fake".to_string(),
        code: 1,
        stderr: "scripted failure".to_string(),
    }
}

/// Counts overlapping background calls.
#[derive(Debug, Default)]
pub struct ActivityProbe {
    active: AtomicUsize,
    max_active: AtomicUsize,
    total: AtomicUsize,
}

impl ActivityProbe {
    fn run<T>(&self, delay: Duration, f: impl FnOnce() -> T) -> T {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(delay);
        let result = f();
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

/// In-memory [`VolumeDirectory`].
#[derive(Debug, Default)]
pub struct FakeDirectory {
    pub volumes: Mutex<Vec<Volume>>,
    pub fail: AtomicBool,
    pub delay: Duration,
    pub probe: Arc<ActivityProbe>,
}

impl FakeDirectory {
    pub fn with_volumes(volumes: Vec<Volume>) -> Self {
        Self {
            volumes: Mutex::new(volumes),
            ..Default::default()
        }
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(scripted_error());
        }
        Ok(())
    }
}

impl VolumeDirectory for FakeDirectory {
    fn list_volumes(&self) -> Result<Vec<Volume>> {
        self.probe.run(self.delay, || {
            self.check()?;
            Ok(self.volumes.lock().unwrap().clone())
        })
    }

    fn resolve_volume(&self, id_or_path: &str) -> Result<Option<Volume>> {
        self.probe.run(self.delay, || {
            self.check()?;
            let target = Path::new(id_or_path);
            Ok(self
                .volumes
                .lock()
                .unwrap()
                .iter()
                .find(|v| v.id == id_or_path || v.device_path == target || v.is_mounted_at(target))
                .cloned())
        })
    }
}

/// Call recorded by [`FakeExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    UnmountNative(String),
    MountNative(String),
    Mount(String, PathBuf),
}

/// Scripted [`MountExecutor`] that records every call.
#[derive(Debug, Default)]
pub struct FakeExecutor {
    pub calls: Mutex<Vec<Call>>,
    pub fail_unmount: bool,
    pub fail_mount: bool,
    pub fail_remount: bool,
    pub delay: Duration,
    pub probe: Arc<ActivityProbe>,
}

impl FakeExecutor {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call, fail: bool) -> Result<()> {
        self.probe.run(self.delay, || {
            self.calls.lock().unwrap().push(call);
            if fail {
                return Err(scripted_error());
            }
            Ok(())
        })
    }
}

impl MountExecutor for FakeExecutor {
    fn unmount_native(&self, volume: &Volume) -> Result<()> {
        self.record(Call::UnmountNative(volume.id.clone()), self.fail_unmount)
    }

    fn mount_native(&self, volume: &Volume) -> Result<()> {
        self.record(Call::MountNative(volume.id.clone()), self.fail_remount)
    }

    fn mount(&self, volume: &Volume, destination: &Path) -> Result<()> {
        self.record(
            Call::Mount(volume.id.clone(), destination.to_path_buf()),
            self.fail_mount,
        )
    }
}
