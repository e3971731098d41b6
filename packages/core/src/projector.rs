//! Pure projection of the session state into menu contents.
//!
//! Front-ends render a [`Projection`]; they never look at the session state
//! directly.

use crate::session::{Phase, SessionState};
use crate::volume::Volume;

pub const RELOADING_LABEL: &str = "Reloading volumes...";
pub const NO_VOLUMES_LABEL: &str = "No NTFS volumes found";
pub const RELOAD_LABEL: &str = "Reload volumes";
pub const QUIT_LABEL: &str = "Quit";

/// Status icon selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusIcon {
    Default,
    Busy,
    Error,
}

/// Why a volume row looks the way it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeStatus {
    /// Its mount is in flight.
    Mounting,
    /// Queued behind another mount.
    Pending,
    /// Already read-write.
    Writable,
    /// Can be clicked to mount.
    Mountable,
}

impl VolumeStatus {
    pub fn tooltip(&self) -> &'static str {
        match self {
            Self::Mounting => "Mounting...",
            Self::Pending => "Pending...",
            Self::Writable => "Volume is writable",
            Self::Mountable => "Click to mount with ntfs-3g",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeItem {
    pub volume_id: String,
    pub label: String,
    pub status: VolumeStatus,
    pub enabled: bool,
    pub checked: bool,
}

impl VolumeItem {
    fn new(volume: &Volume, status: VolumeStatus) -> Self {
        Self {
            volume_id: volume.id.clone(),
            label: volume.label(),
            status,
            enabled: status == VolumeStatus::Mountable,
            checked: status == VolumeStatus::Writable,
        }
    }

    pub fn tooltip(&self) -> &'static str {
        self.status.tooltip()
    }
}

/// One menu line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuItem {
    /// Disabled informational line.
    Text(String),
    Separator,
    Volume(VolumeItem),
    /// Triggers `UserRequestsReload`.
    Reload,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub icon: StatusIcon,
    pub items: Vec<MenuItem>,
    pub visible: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectorOptions {
    /// Keep the menu visible even when there is nothing in it.
    pub always_show: bool,
}

/// Projects `state` into menu contents.
pub fn project(state: &SessionState, options: &ProjectorOptions) -> Projection {
    let icon = match state.phase {
        Phase::Ready => StatusIcon::Default,
        Phase::Reloading | Phase::Mounting => StatusIcon::Busy,
        Phase::SoftFailed(_) | Phase::HardFailed(_) => StatusIcon::Error,
    };
    let reloading_empty = state.phase == Phase::Reloading && state.volumes.is_empty();

    let mut items = Vec::new();
    if let Some(message) = state.phase.failure_message() {
        items.push(MenuItem::Text(message.to_string()));
    } else {
        if let Some(failed) = &state.last_mount_failure {
            items.push(MenuItem::Text(format!("Failed to mount: {}", failed.name)));
            items.push(MenuItem::Separator);
        }

        if reloading_empty {
            items.push(MenuItem::Text(RELOADING_LABEL.to_string()));
        } else if state.volumes.is_empty() {
            items.push(MenuItem::Text(NO_VOLUMES_LABEL.to_string()));
        } else {
            items.extend(state.volumes.iter().map(|volume| {
                MenuItem::Volume(VolumeItem::new(volume, volume_status(state, volume)))
            }));
        }
    }

    if !matches!(state.phase, Phase::HardFailed(_)) {
        items.push(MenuItem::Separator);
        items.push(MenuItem::Reload);
    }
    items.push(MenuItem::Separator);
    items.push(MenuItem::Quit);

    let visible = state.phase.is_failed()
        || reloading_empty
        || options.always_show
        || !state.volumes.is_empty();

    Projection {
        icon,
        items,
        visible,
    }
}

fn volume_status(state: &SessionState, volume: &Volume) -> VolumeStatus {
    if state.is_mounting(&volume.id) {
        VolumeStatus::Mounting
    } else if state.is_queued(&volume.id) {
        VolumeStatus::Pending
    } else if volume.is_writable() {
        VolumeStatus::Writable
    } else {
        VolumeStatus::Mountable
    }
}

impl Projection {
    /// Volume rows, in menu order.
    pub fn volume_items(&self) -> impl Iterator<Item = &VolumeItem> {
        self.items.iter().filter_map(|item| match item {
            MenuItem::Volume(volume) => Some(volume),
            _ => None,
        })
    }
}
