//! Session controller: the state machine behind the status menu.
//!
//! The controller turns OS volume notifications, user intents and background
//! task completions into at most one background [`Task`] at a time. It never
//! performs I/O; whoever drives it (see [`crate::runtime`]) runs the returned
//! task on a worker and feeds the completion back as another [`Event`].
//!
//! Precedence in [`SessionController::advance`] is failure, then reload, then
//! mount. A reload requested while a task is in flight is parked in
//! [`PendingReload`] and picked up once that task completes.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::mount::MountOutcome;
use crate::volume::{self, Volume};

/// Message shown when the volume directory cannot be queried.
pub const RELOAD_FAILED_MESSAGE: &str = "Failed to retrieve NTFS volumes";

/// Lifecycle phase of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Idle; the next queued operation may start.
    Ready,
    /// A full or targeted reload is in flight.
    Reloading,
    /// A mount of `active_mount` is in flight.
    Mounting,
    /// Recoverable failure; waits for an explicit reset.
    SoftFailed(String),
    /// Environment defect found at startup.
    HardFailed(String),
}

impl Phase {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::SoftFailed(_) | Self::HardFailed(_))
    }

    /// Message of a failed phase.
    pub fn failure_message(&self) -> Option<&str> {
        match self {
            Self::SoftFailed(message) | Self::HardFailed(message) => Some(message),
            _ => None,
        }
    }
}

/// Coalesced reload request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PendingReload {
    #[default]
    None,
    Full,
    /// Reload a single volume by identifier or path.
    Targeted(String),
}

impl PendingReload {
    /// Records a targeted reload. Anything already pending escalates to a
    /// full reload instead of being overwritten.
    fn target(&mut self, id_or_path: String) {
        *self = match self {
            Self::None => Self::Targeted(id_or_path),
            Self::Targeted(existing) if *existing == id_or_path => Self::Targeted(id_or_path),
            _ => Self::Full,
        };
    }
}

/// Background work requested by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// `list_volumes()`.
    ReloadAll,
    /// `resolve_volume(target)`.
    Resolve { target: String },
    /// Run the mount pipeline on a snapshot of the volume.
    Mount {
        volume: Volume,
        destination: Option<PathBuf>,
    },
}

impl Task {
    /// Completion event to deliver when the task could not be run at all.
    pub fn failed(self, error: Error) -> Event {
        match self {
            Self::ReloadAll => Event::ReloadFinished(Err(error)),
            Self::Resolve { .. } => Event::ResolveFinished(Err(error)),
            Self::Mount { volume, .. } => Event::MountFinished {
                volume,
                outcome: MountOutcome::MountFailed {
                    message: error.to_string(),
                    restored: None,
                },
            },
        }
    }

    /// Short name for logs and thread names.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ReloadAll => "reload",
            Self::Resolve { .. } => "resolve",
            Self::Mount { .. } => "mount",
        }
    }
}

/// Everything the controller reacts to.
#[derive(Debug)]
pub enum Event {
    /// A volume appeared at `path`.
    VolumeAttached { path: PathBuf },
    /// The volume at `path` went away.
    VolumeDetached { path: PathBuf },
    VolumeRenamed {
        old_path: PathBuf,
        new_name: String,
        new_path: PathBuf,
    },
    EnvironmentCheckFailed { message: String },
    UserRequestsMount { volume_id: String },
    UserRequestsReload,
    /// Re-initialize the session from a failed phase.
    Reset,
    ReloadFinished(crate::Result<Vec<Volume>>),
    ResolveFinished(crate::Result<Option<Volume>>),
    MountFinished {
        volume: Volume,
        outcome: MountOutcome,
    },
}

impl Event {
    /// Whether this event reports the end of a [`Task`].
    pub fn is_completion(&self) -> bool {
        matches!(
            self,
            Self::ReloadFinished(_) | Self::ResolveFinished(_) | Self::MountFinished { .. }
        )
    }
}

/// All mutable session state. Only [`SessionController`] mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub phase: Phase,
    pub pending_reload: PendingReload,
    /// Tracked volumes ordered by id: mounted, internal, or being mounted.
    pub volumes: Vec<Volume>,
    /// Volume ids waiting for a mount attempt.
    pub mount_queue: VecDeque<String>,
    /// Volume whose mount is in flight.
    pub active_mount: Option<Volume>,
    /// Most recent failed mount, cleared by the next success.
    pub last_mount_failure: Option<Volume>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: Phase::Ready,
            pending_reload: PendingReload::Full,
            volumes: Vec::new(),
            mount_queue: VecDeque::new(),
            active_mount: None,
            last_mount_failure: None,
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_mounting(&self, id: &str) -> bool {
        self.active_mount.as_ref().is_some_and(|v| v.id == id)
    }

    pub fn is_queued(&self, id: &str) -> bool {
        self.mount_queue.iter().any(|queued| queued == id)
    }

    pub fn find_volume(&self, id: &str) -> Option<&Volume> {
        self.volumes.iter().find(|v| v.id == id)
    }

    /// Tracked volume mounted at `path`.
    pub fn find_volume_at(&self, path: &Path) -> Option<&Volume> {
        self.volumes.iter().find(|v| v.is_mounted_at(path))
    }

    /// Whether a full scan result belongs in the tracked list.
    fn should_track(&self, volume: &Volume) -> bool {
        volume.is_mounted() || volume.is_internal || self.is_mounting(&volume.id)
    }
}

/// Owns the [`SessionState`] and applies events to it.
#[derive(Debug, Default)]
pub struct SessionController {
    state: SessionState,
    /// A task was handed out and its completion has not arrived yet.
    in_flight: bool,
    /// The in-flight task was started before the last reset.
    stale: bool,
}

impl SessionController {
    /// Fresh session: ready, with a full reload pending.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Whether a task is outstanding.
    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    /// Applies `event` and advances. Returns the task to start, if any.
    pub fn handle(&mut self, event: Event) -> Option<Task> {
        debug!(?event, phase = ?self.state.phase, "handling event");

        if event.is_completion() {
            self.in_flight = false;
            if std::mem::take(&mut self.stale) {
                info!("dropping result of a task started before reset");
                return self.advance();
            }
        }

        match event {
            Event::VolumeAttached { path } => self.on_volume_attached(path),
            Event::VolumeDetached { path } => self.on_volume_detached(&path),
            Event::VolumeRenamed {
                old_path,
                new_name,
                new_path,
            } => self.on_volume_renamed(&old_path, new_name, new_path),
            Event::EnvironmentCheckFailed { message } => {
                self.on_environment_check_failed(message)
            }
            Event::UserRequestsMount { volume_id } => self.on_user_requests_mount(volume_id),
            Event::UserRequestsReload => self.on_user_requests_reload(),
            Event::Reset => self.reset(),
            Event::ReloadFinished(result) => self.on_reload_finished(result),
            Event::ResolveFinished(result) => self.on_resolve_finished(result),
            Event::MountFinished { volume, outcome } => self.on_mount_finished(volume, outcome),
        }

        self.advance()
    }

    /// Decides the next background operation.
    ///
    /// Starts nothing while a task is outstanding or the phase is not
    /// [`Phase::Ready`], so at most one task is ever in flight.
    pub fn advance(&mut self) -> Option<Task> {
        if self.in_flight || self.state.phase != Phase::Ready {
            return None;
        }

        let task = self.next_task();
        self.in_flight = task.is_some();
        task
    }

    fn next_task(&mut self) -> Option<Task> {
        match std::mem::take(&mut self.state.pending_reload) {
            PendingReload::Full => {
                self.state.phase = Phase::Reloading;
                return Some(Task::ReloadAll);
            }
            PendingReload::Targeted(target) => {
                self.state.phase = Phase::Reloading;
                return Some(Task::Resolve { target });
            }
            PendingReload::None => {}
        }

        while let Some(id) = self.state.mount_queue.pop_front() {
            let Some(volume) = self.state.find_volume(&id).cloned() else {
                warn!(volume = %id, "queued volume is no longer tracked, skipping");
                continue;
            };

            info!(volume = %volume.id, "starting mount");
            let destination = volume.mounted_path.clone();
            self.state.active_mount = Some(volume.clone());
            self.state.phase = Phase::Mounting;
            return Some(Task::Mount {
                volume,
                destination,
            });
        }

        None
    }

    fn on_volume_attached(&mut self, path: PathBuf) {
        match self.state.phase {
            Phase::Ready => self
                .state
                .pending_reload
                .target(path.to_string_lossy().to_string()),
            Phase::Reloading | Phase::Mounting => {
                self.state.pending_reload = PendingReload::Full;
            }
            Phase::SoftFailed(_) | Phase::HardFailed(_) => {}
        }
    }

    fn on_volume_detached(&mut self, path: &Path) {
        if self.state.phase.is_failed() {
            return;
        }

        let volume = self.state.find_volume_at(path).cloned();
        match (&self.state.phase, volume) {
            (Phase::Ready, Some(volume)) => {
                if volume.is_internal {
                    // A full reload keeps unmounted internal volumes, so a
                    // direct update must too.
                    volume::upsert_volume(&mut self.state.volumes, volume.unmounted());
                } else {
                    volume::remove_volume(&mut self.state.volumes, &volume.id);
                }
            }
            (Phase::Ready, None) => {}
            // Our own mount task unmounts the native mount first.
            (_, Some(volume)) if self.state.is_mounting(&volume.id) => {}
            _ => self.state.pending_reload = PendingReload::Full,
        }
    }

    fn on_volume_renamed(&mut self, old_path: &Path, new_name: String, new_path: PathBuf) {
        if self.state.phase.is_failed() {
            return;
        }

        let old_volume = self.state.find_volume_at(old_path).cloned();
        match (&self.state.phase, old_volume) {
            (Phase::Ready, Some(old_volume)) => {
                let renamed = old_volume.renamed(new_name, new_path);
                volume::upsert_volume(&mut self.state.volumes, renamed);
            }
            _ => self.state.pending_reload = PendingReload::Full,
        }
    }

    fn on_environment_check_failed(&mut self, message: String) {
        error!(%message, "environment check failed");
        self.state.phase = Phase::HardFailed(message);
    }

    fn on_user_requests_mount(&mut self, volume_id: String) {
        if self.state.phase.is_failed() {
            return;
        }
        if self.state.is_mounting(&volume_id) || self.state.is_queued(&volume_id) {
            debug!(volume = %volume_id, "mount already requested");
            return;
        }
        self.state.mount_queue.push_back(volume_id);
    }

    fn on_user_requests_reload(&mut self) {
        match self.state.phase {
            Phase::HardFailed(_) => {}
            // Reloading out of a soft failure is the operator's reset.
            Phase::SoftFailed(_) => self.reset(),
            _ => self.state.pending_reload = PendingReload::Full,
        }
    }

    /// Starts over from a failed phase. A task still in flight keeps the
    /// new session idle until its completion arrives, and that completion
    /// is then discarded.
    fn reset(&mut self) {
        if self.state.phase.is_failed() {
            info!(in_flight = self.in_flight, "resetting session");
            self.state = SessionState::new();
            self.stale = self.in_flight;
        }
    }

    fn on_reload_finished(&mut self, result: crate::Result<Vec<Volume>>) {
        if self.state.phase.is_failed() {
            return;
        }

        match result {
            Ok(volumes) => {
                let mut tracked: Vec<Volume> = volumes
                    .into_iter()
                    .filter(|v| self.state.should_track(v))
                    .collect();
                volume::sort_volumes(&mut tracked);
                info!(count = tracked.len(), "volume list reloaded");
                self.state.volumes = tracked;
                self.state.phase = Phase::Ready;
            }
            Err(e) => self.soft_fail(&e),
        }
    }

    fn on_resolve_finished(&mut self, result: crate::Result<Option<Volume>>) {
        if self.state.phase.is_failed() {
            return;
        }

        match result {
            Ok(resolved) => {
                if let Some(volume) = resolved {
                    volume::upsert_volume(&mut self.state.volumes, volume);
                }
                self.state.phase = Phase::Ready;
            }
            Err(e) => self.soft_fail(&e),
        }
    }

    fn on_mount_finished(&mut self, volume: Volume, outcome: MountOutcome) {
        if self.state.phase.is_failed() {
            return;
        }

        self.state.active_mount = None;
        self.state.phase = Phase::Ready;

        if outcome.is_success() {
            let mut writable = volume.into_writable();
            if let MountOutcome::Mounted { path } = outcome {
                writable.mounted_path = Some(path);
            }
            volume::upsert_volume(&mut self.state.volumes, writable);
            self.state.last_mount_failure = None;
        } else {
            warn!(volume = %volume.id, ?outcome, "mount failed, reloading volumes");
            self.state.last_mount_failure = Some(volume);
            // The volume's real state after a failed attempt is unknown.
            self.state.pending_reload = PendingReload::Full;
        }
    }

    fn soft_fail(&mut self, e: &Error) {
        error!(error = %e, "{}", RELOAD_FAILED_MESSAGE);
        self.state.phase = Phase::SoftFailed(RELOAD_FAILED_MESSAGE.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::VolumeDirectory;
    use crate::testing::{FakeDirectory, mounted, sample_volume};
    use crate::volume::Access;

    fn internal(id: &str, name: &str) -> Volume {
        Volume {
            is_internal: true,
            ..sample_volume(id, name)
        }
    }

    fn io_error() -> Error {
        Error::CommandExit {
            command: "diskutil".to_string(),
            code: 1,
            stderr: "boom".to_string(),
        }
    }

    fn mounted_ok() -> MountOutcome {
        MountOutcome::Mounted {
            path: PathBuf::from("/Volumes/USB"),
        }
    }

    fn mount_failed() -> MountOutcome {
        MountOutcome::MountFailed {
            message: "ntfs-3g failed".to_string(),
            restored: Some(true),
        }
    }

    /// Controller that has finished its initial reload with `volumes`.
    fn ready_with(volumes: Vec<Volume>) -> SessionController {
        let mut controller = SessionController::new();
        assert_eq!(controller.advance(), Some(Task::ReloadAll));
        assert_eq!(controller.handle(Event::ReloadFinished(Ok(volumes))), None);
        assert_eq!(controller.state().phase, Phase::Ready);
        controller
    }

    fn ids(controller: &SessionController) -> Vec<&str> {
        controller
            .state()
            .volumes
            .iter()
            .map(|v| v.id.as_str())
            .collect()
    }

    #[test]
    fn test_initial_state() {
        let controller = SessionController::new();
        assert_eq!(controller.state().phase, Phase::Ready);
        assert_eq!(controller.state().pending_reload, PendingReload::Full);
    }

    #[test]
    fn test_reload_filters_and_sorts() {
        let controller = ready_with(vec![
            mounted("disk6s1", "Backup"),
            sample_volume("disk5s1", "Unmounted"),
            internal("disk0s3", "BOOTCAMP"),
            mounted("disk4s1", "USB"),
        ]);

        assert_eq!(ids(&controller), vec!["disk0s3", "disk4s1", "disk6s1"]);
        assert_eq!(controller.state().pending_reload, PendingReload::None);
    }

    #[test]
    fn test_user_mount_starts_mount_task() {
        let mut controller = ready_with(vec![mounted("disk4s1", "USB")]);

        let task = controller.handle(Event::UserRequestsMount {
            volume_id: "disk4s1".to_string(),
        });

        assert_eq!(
            task,
            Some(Task::Mount {
                volume: mounted("disk4s1", "USB"),
                destination: Some(PathBuf::from("/Volumes/USB")),
            })
        );
        assert_eq!(controller.state().phase, Phase::Mounting);
        assert!(controller.state().is_mounting("disk4s1"));
    }

    #[test]
    fn test_mount_request_is_idempotent() {
        let mut controller = ready_with(vec![mounted("disk4s1", "USB"), mounted("disk5s1", "B")]);
        controller.handle(Event::UserRequestsMount {
            volume_id: "disk4s1".to_string(),
        });

        for _ in 0..2 {
            assert_eq!(
                controller.handle(Event::UserRequestsMount {
                    volume_id: "disk5s1".to_string(),
                }),
                None
            );
        }
        // Already active.
        controller.handle(Event::UserRequestsMount {
            volume_id: "disk4s1".to_string(),
        });

        assert_eq!(controller.state().mount_queue, VecDeque::from(["disk5s1".to_string()]));
    }

    #[test]
    fn test_second_mount_waits_for_first() {
        let mut controller = ready_with(vec![mounted("disk4s1", "V1"), mounted("disk5s1", "V2")]);

        let first = controller.handle(Event::UserRequestsMount {
            volume_id: "disk4s1".to_string(),
        });
        let second = controller.handle(Event::UserRequestsMount {
            volume_id: "disk5s1".to_string(),
        });
        assert!(matches!(first, Some(Task::Mount { ref volume, .. }) if volume.id == "disk4s1"));
        assert_eq!(second, None);
        assert!(controller.state().is_queued("disk5s1"));

        let next = controller.handle(Event::MountFinished {
            volume: mounted("disk4s1", "V1"),
            outcome: mounted_ok(),
        });

        assert!(matches!(next, Some(Task::Mount { ref volume, .. }) if volume.id == "disk5s1"));
        assert!(controller.state().find_volume("disk4s1").unwrap().is_writable());
    }

    #[test]
    fn test_mount_success_marks_writable_and_clears_failure() {
        let mut controller = ready_with(vec![mounted("disk4s1", "USB")]);
        controller.handle(Event::UserRequestsMount {
            volume_id: "disk4s1".to_string(),
        });
        controller.handle(Event::MountFinished {
            volume: mounted("disk4s1", "USB"),
            outcome: mount_failed(),
        });
        assert!(controller.state().last_mount_failure.is_some());

        // The failure forces a reload before anything else.
        controller.handle(Event::ReloadFinished(Ok(vec![mounted("disk4s1", "USB")])));
        controller.handle(Event::UserRequestsMount {
            volume_id: "disk4s1".to_string(),
        });
        let next = controller.handle(Event::MountFinished {
            volume: mounted("disk4s1", "USB"),
            outcome: mounted_ok(),
        });

        assert_eq!(next, None);
        let state = controller.state();
        assert_eq!(state.phase, Phase::Ready);
        assert_eq!(state.active_mount, None);
        assert_eq!(state.last_mount_failure, None);
        assert_eq!(state.find_volume("disk4s1").unwrap().access, Access::Writable);
    }

    #[test]
    fn test_failed_mount_requests_reload_before_next_mount() {
        let mut controller = ready_with(vec![mounted("disk4s1", "V1"), mounted("disk5s1", "V2")]);
        controller.handle(Event::UserRequestsMount {
            volume_id: "disk4s1".to_string(),
        });
        controller.handle(Event::UserRequestsMount {
            volume_id: "disk5s1".to_string(),
        });

        let next = controller.handle(Event::MountFinished {
            volume: mounted("disk4s1", "V1"),
            outcome: mount_failed(),
        });

        assert_eq!(next, Some(Task::ReloadAll));
        let state = controller.state();
        assert_eq!(state.phase, Phase::Reloading);
        assert_eq!(state.active_mount, None);
        assert_eq!(state.last_mount_failure.as_ref().unwrap().id, "disk4s1");
        assert!(state.is_queued("disk5s1"));
    }

    #[test]
    fn test_attach_while_ready_is_targeted() {
        let mut controller = ready_with(vec![]);

        let task = controller.handle(Event::VolumeAttached {
            path: PathBuf::from("/Volumes/USB"),
        });
        assert_eq!(
            task,
            Some(Task::Resolve {
                target: "/Volumes/USB".to_string()
            })
        );

        let next = controller.handle(Event::ResolveFinished(Ok(Some(mounted("disk4s1", "USB")))));
        assert_eq!(next, None);
        assert_eq!(ids(&controller), vec!["disk4s1"]);
    }

    #[test]
    fn test_attach_of_non_ntfs_volume_is_noop() {
        let mut controller = ready_with(vec![mounted("disk4s1", "USB")]);
        controller.handle(Event::VolumeAttached {
            path: PathBuf::from("/Volumes/FAT"),
        });

        controller.handle(Event::ResolveFinished(Ok(None)));

        assert_eq!(controller.state().phase, Phase::Ready);
        assert_eq!(ids(&controller), vec!["disk4s1"]);
    }

    #[test]
    fn test_attach_while_mounting_escalates_and_waits() {
        let mut controller = ready_with(vec![mounted("disk4s1", "USB")]);
        controller.handle(Event::UserRequestsMount {
            volume_id: "disk4s1".to_string(),
        });

        let task = controller.handle(Event::VolumeAttached {
            path: PathBuf::from("/Volumes/Other"),
        });
        assert_eq!(task, None);
        assert_eq!(controller.state().pending_reload, PendingReload::Full);
        assert_eq!(controller.state().phase, Phase::Mounting);

        let next = controller.handle(Event::MountFinished {
            volume: mounted("disk4s1", "USB"),
            outcome: mounted_ok(),
        });
        assert_eq!(next, Some(Task::ReloadAll));
    }

    #[test]
    fn test_two_attaches_coalesce_into_full_reload() {
        let mut pending = PendingReload::None;
        pending.target("/Volumes/A".to_string());
        pending.target("/Volumes/A".to_string());
        assert_eq!(pending, PendingReload::Targeted("/Volumes/A".to_string()));
        pending.target("/Volumes/B".to_string());
        assert_eq!(pending, PendingReload::Full);
        pending.target("/Volumes/C".to_string());
        assert_eq!(pending, PendingReload::Full);
    }

    #[test]
    fn test_detach_while_ready_removes_directly() {
        let mut controller = ready_with(vec![mounted("disk4s1", "USB"), mounted("disk5s1", "B")]);

        let task = controller.handle(Event::VolumeDetached {
            path: PathBuf::from("/Volumes/USB"),
        });

        assert_eq!(task, None);
        assert_eq!(ids(&controller), vec!["disk5s1"]);
    }

    #[test]
    fn test_detach_of_internal_volume_keeps_it_unmounted() {
        let mut volume = internal("disk0s3", "BOOTCAMP");
        volume.mounted_path = Some(PathBuf::from("/Volumes/BOOTCAMP"));
        volume.access = Access::ReadOnly;
        let mut controller = ready_with(vec![volume]);

        controller.handle(Event::VolumeDetached {
            path: PathBuf::from("/Volumes/BOOTCAMP"),
        });

        let volume = controller.state().find_volume("disk0s3").unwrap();
        assert!(!volume.is_mounted());
        assert_eq!(volume.access, Access::NotApplicable);
    }

    #[test]
    fn test_detach_of_active_mount_is_ignored() {
        let mut controller = ready_with(vec![mounted("disk4s1", "USB")]);
        controller.handle(Event::UserRequestsMount {
            volume_id: "disk4s1".to_string(),
        });

        controller.handle(Event::VolumeDetached {
            path: PathBuf::from("/Volumes/USB"),
        });

        assert_eq!(controller.state().pending_reload, PendingReload::None);
        assert_eq!(ids(&controller), vec!["disk4s1"]);
    }

    #[test]
    fn test_detach_while_busy_escalates() {
        let mut controller = ready_with(vec![mounted("disk4s1", "USB"), mounted("disk5s1", "B")]);
        controller.handle(Event::UserRequestsMount {
            volume_id: "disk4s1".to_string(),
        });

        controller.handle(Event::VolumeDetached {
            path: PathBuf::from("/Volumes/B"),
        });

        assert_eq!(controller.state().pending_reload, PendingReload::Full);
    }

    #[test]
    fn test_rename_while_ready_replaces_in_place() {
        let mut volume = mounted("disk4s1", "USB");
        volume.access = Access::Writable;
        let mut controller = ready_with(vec![volume]);

        let task = controller.handle(Event::VolumeRenamed {
            old_path: PathBuf::from("/Volumes/USB"),
            new_name: "Backup".to_string(),
            new_path: PathBuf::from("/Volumes/Backup"),
        });

        assert_eq!(task, None);
        let renamed = controller.state().find_volume("disk4s1").unwrap();
        assert_eq!(renamed.name, "Backup");
        assert_eq!(renamed.access, Access::Writable);
        assert!(renamed.is_mounted_at(Path::new("/Volumes/Backup")));
    }

    #[test]
    fn test_rename_of_unknown_volume_reloads() {
        let mut controller = ready_with(vec![]);

        let task = controller.handle(Event::VolumeRenamed {
            old_path: PathBuf::from("/Volumes/Unknown"),
            new_name: "X".to_string(),
            new_path: PathBuf::from("/Volumes/X"),
        });

        assert_eq!(task, Some(Task::ReloadAll));
    }

    #[test]
    fn test_reload_failure_soft_fails_and_preserves_state() {
        let mut controller = ready_with(vec![mounted("disk4s1", "V1"), mounted("disk5s1", "V2")]);
        controller.handle(Event::UserRequestsMount {
            volume_id: "disk4s1".to_string(),
        });
        controller.handle(Event::UserRequestsMount {
            volume_id: "disk5s1".to_string(),
        });
        controller.handle(Event::UserRequestsReload);
        let next = controller.handle(Event::MountFinished {
            volume: mounted("disk4s1", "V1"),
            outcome: mounted_ok(),
        });
        assert_eq!(next, Some(Task::ReloadAll));
        let before = controller.state().clone();

        let next = controller.handle(Event::ReloadFinished(Err(io_error())));

        assert_eq!(next, None);
        let state = controller.state();
        assert_eq!(
            state.phase,
            Phase::SoftFailed(RELOAD_FAILED_MESSAGE.to_string())
        );
        assert_eq!(state.volumes, before.volumes);
        assert_eq!(state.mount_queue, before.mount_queue);

        // Nothing moves until a reset.
        for event in [
            Event::VolumeAttached {
                path: PathBuf::from("/Volumes/X"),
            },
            Event::UserRequestsMount {
                volume_id: "disk4s1".to_string(),
            },
        ] {
            assert_eq!(controller.handle(event), None);
        }
        assert!(controller.state().phase.is_failed());

        assert_eq!(controller.handle(Event::UserRequestsReload), Some(Task::ReloadAll));
        assert!(controller.state().mount_queue.is_empty());
    }

    #[test]
    fn test_resolve_failure_soft_fails() {
        let mut controller = ready_with(vec![]);
        controller.handle(Event::VolumeAttached {
            path: PathBuf::from("/Volumes/USB"),
        });

        controller.handle(Event::ResolveFinished(Err(io_error())));

        assert_eq!(
            controller.state().phase.failure_message(),
            Some(RELOAD_FAILED_MESSAGE)
        );
    }

    #[test]
    fn test_hard_failure_blocks_everything_but_reset() {
        let mut controller = SessionController::new();

        let task = controller.handle(Event::EnvironmentCheckFailed {
            message: "Failed to detect macFUSE".to_string(),
        });
        assert_eq!(task, None);
        assert_eq!(
            controller.state().phase,
            Phase::HardFailed("Failed to detect macFUSE".to_string())
        );

        assert_eq!(controller.handle(Event::UserRequestsReload), None);
        assert!(controller.state().phase.is_failed());

        assert_eq!(controller.handle(Event::Reset), Some(Task::ReloadAll));
        assert_eq!(controller.state().phase, Phase::Reloading);
    }

    #[test]
    fn test_reset_outside_failure_is_ignored() {
        let mut controller = ready_with(vec![mounted("disk4s1", "USB")]);
        assert_eq!(controller.handle(Event::Reset), None);
        assert_eq!(ids(&controller), vec!["disk4s1"]);
    }

    #[test]
    fn test_reset_waits_for_reload_started_before_failure() {
        let mut controller = SessionController::new();
        assert_eq!(controller.advance(), Some(Task::ReloadAll));
        controller.handle(Event::EnvironmentCheckFailed {
            message: "Failed to detect macFUSE".to_string(),
        });

        assert_eq!(controller.handle(Event::Reset), None);
        assert_eq!(controller.state().phase, Phase::Ready);
        assert!(controller.is_busy());
        assert_eq!(
            controller.handle(Event::UserRequestsMount {
                volume_id: "disk4s1".to_string(),
            }),
            None
        );

        // The old result is discarded; the reset's own reload runs next.
        let next = controller.handle(Event::ReloadFinished(Ok(vec![mounted("disk4s1", "USB")])));
        assert_eq!(next, Some(Task::ReloadAll));
        assert_eq!(controller.state().phase, Phase::Reloading);
        assert!(controller.state().volumes.is_empty());

        let next = controller.handle(Event::ReloadFinished(Ok(vec![mounted("disk4s1", "USB")])));
        assert!(matches!(next, Some(Task::Mount { ref volume, .. }) if volume.id == "disk4s1"));
    }

    #[test]
    fn test_reset_discards_mount_started_before_failure() {
        let mut controller = ready_with(vec![mounted("disk4s1", "USB")]);
        controller.handle(Event::UserRequestsMount {
            volume_id: "disk4s1".to_string(),
        });
        controller.handle(Event::EnvironmentCheckFailed {
            message: "Failed to detect macFUSE".to_string(),
        });
        assert_eq!(controller.handle(Event::Reset), None);

        let next = controller.handle(Event::MountFinished {
            volume: mounted("disk4s1", "USB"),
            outcome: mounted_ok(),
        });

        assert_eq!(next, Some(Task::ReloadAll));
        let state = controller.state();
        assert!(state.volumes.is_empty());
        assert_eq!(state.active_mount, None);
        assert_eq!(state.last_mount_failure, None);
    }

    #[test]
    fn test_direct_updates_match_full_reload() {
        let mut bootcamp = internal("disk0s3", "BOOTCAMP");
        bootcamp.mounted_path = Some(PathBuf::from("/Volumes/BOOTCAMP"));
        bootcamp.access = Access::ReadOnly;
        let mut listing = vec![
            mounted("disk5s1", "Data"),
            bootcamp,
            mounted("disk4s1", "USB"),
            internal("disk2s1", "Spare"),
        ];
        let directory = FakeDirectory::with_volumes(listing.clone());
        let mut controller = ready_with(directory.list_volumes().unwrap());

        listing[1] = listing[1].unmounted();
        *directory.volumes.lock().unwrap() = listing.clone();
        let task = controller.handle(Event::VolumeDetached {
            path: PathBuf::from("/Volumes/BOOTCAMP"),
        });
        assert_eq!(task, None);

        listing[2] = listing[2].renamed("Backup", "/Volumes/Backup");
        *directory.volumes.lock().unwrap() = listing.clone();
        let task = controller.handle(Event::VolumeRenamed {
            old_path: PathBuf::from("/Volumes/USB"),
            new_name: "Backup".to_string(),
            new_path: PathBuf::from("/Volumes/Backup"),
        });
        assert_eq!(task, None);

        listing.push(mounted("disk7s1", "New"));
        *directory.volumes.lock().unwrap() = listing.clone();
        for path in ["/Volumes/New", "/Volumes/FAT"] {
            let target = match controller.handle(Event::VolumeAttached {
                path: PathBuf::from(path),
            }) {
                Some(Task::Resolve { target }) => target,
                other => panic!("expected a targeted reload, got {:?}", other),
            };
            let next = controller.handle(Event::ResolveFinished(directory.resolve_volume(&target)));
            assert_eq!(next, None);
        }

        listing[0] = listing[0].unmounted();
        *directory.volumes.lock().unwrap() = listing.clone();
        let task = controller.handle(Event::VolumeDetached {
            path: PathBuf::from("/Volumes/Data"),
        });
        assert_eq!(task, None);

        let reloaded = ready_with(directory.list_volumes().unwrap());
        assert_eq!(controller.state().phase, Phase::Ready);
        assert_eq!(controller.state().volumes, reloaded.state().volumes);
        assert_eq!(ids(&controller), vec!["disk0s3", "disk2s1", "disk4s1", "disk7s1"]);
    }

    #[test]
    fn test_reload_keeps_volume_being_mounted() {
        let mut controller = SessionController::new();
        controller.state.volumes = vec![sample_volume("disk4s1", "USB")];
        controller.state.pending_reload = PendingReload::None;
        controller.handle(Event::UserRequestsMount {
            volume_id: "disk4s1".to_string(),
        });
        assert_eq!(controller.state().phase, Phase::Mounting);

        // Unmounted removable volumes are only kept while they are mounting.
        controller.state.phase = Phase::Reloading;
        controller.handle(Event::ReloadFinished(Ok(vec![
            sample_volume("disk4s1", "USB"),
            sample_volume("disk5s1", "Other"),
        ])));

        assert_eq!(ids(&controller), vec!["disk4s1"]);
    }

    #[test]
    fn test_queued_volume_that_vanished_is_skipped() {
        let mut controller = ready_with(vec![mounted("disk4s1", "V1"), mounted("disk5s1", "V2")]);
        controller.handle(Event::UserRequestsMount {
            volume_id: "disk4s1".to_string(),
        });
        controller.handle(Event::UserRequestsMount {
            volume_id: "gone".to_string(),
        });
        controller.handle(Event::UserRequestsMount {
            volume_id: "disk5s1".to_string(),
        });

        let next = controller.handle(Event::MountFinished {
            volume: mounted("disk4s1", "V1"),
            outcome: mounted_ok(),
        });

        assert!(matches!(next, Some(Task::Mount { ref volume, .. }) if volume.id == "disk5s1"));
        assert!(controller.state().mount_queue.is_empty());
    }

    #[test]
    fn test_task_failed_maps_to_completion() {
        let event = Task::Mount {
            volume: mounted("disk4s1", "USB"),
            destination: None,
        }
        .failed(io_error());
        assert!(matches!(
            event,
            Event::MountFinished {
                outcome: MountOutcome::MountFailed { .. },
                ..
            }
        ));
        assert!(matches!(
            Task::ReloadAll.failed(io_error()),
            Event::ReloadFinished(Err(_))
        ));
    }
}
