//! ntfsmount TUI - Status menu for NTFS volumes.
//!
//! Watches for NTFS volumes and remounts them read-write via ntfs-3g on
//! request. Logs go to `~/Library/Logs/ntfsmount.log`.

mod app;
mod logging;
mod ui;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ntfsmount_core::environment;
use ntfsmount_core::session::Phase;
use ntfsmount_core::{Config, Diskutil, Event, MountWatcher, Ntfs3gExecutor, Runtime};
use ratatui::DefaultTerminal;
use ratatui::crossterm::event::{self, Event as TermEvent, KeyEventKind};
use tracing::{error, info, warn};

use crate::app::{Action, App};

/// How long to wait for a key before draining runtime events again.
const TICK: Duration = Duration::from_millis(100);

/// A running session: the runtime and the watcher feeding it.
struct Session {
    runtime: Runtime<App>,
    watcher: Option<MountWatcher>,
}

impl Session {
    /// Probes the environment and starts the session the way it starts at
    /// launch.
    fn start(config: &Config) -> Self {
        let check = environment::check(config);
        let version = check.as_ref().ok().and_then(|info| info.ntfs_3g);
        let ntfs_3g = config
            .ntfs_3g_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("ntfs-3g"));

        let mut runtime = Runtime::new(
            Arc::new(Diskutil),
            Arc::new(Ntfs3gExecutor::new(ntfs_3g, version)),
            App::default(),
            config,
        );

        match check {
            Ok(info) => {
                info!(?info, "environment ok");
                let watcher = match MountWatcher::spawn(runtime.sender(), config) {
                    Ok(watcher) => Some(watcher),
                    Err(e) => {
                        warn!(error = %e, "mount watcher unavailable, use reload");
                        None
                    }
                };
                runtime.advance();
                Self { runtime, watcher }
            }
            Err(message) => {
                runtime.handle(Event::EnvironmentCheckFailed { message });
                Self {
                    runtime,
                    watcher: None,
                }
            }
        }
    }

    fn stop(self) {
        if let Some(watcher) = self.watcher {
            watcher.stop();
        }
    }
}

fn main() -> io::Result<()> {
    let _guard = logging::init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load config");
            eprintln!("ntfsmount: {}", e);
            std::process::exit(1);
        }
    };

    let mut session = Session::start(&config);

    let mut terminal = ratatui::init();
    let result = run(&mut terminal, &mut session, &config);
    ratatui::restore();

    session.stop();
    result
}

fn run(terminal: &mut DefaultTerminal, session: &mut Session, config: &Config) -> io::Result<()> {
    loop {
        session.runtime.pump();
        terminal.draw(|frame| ui::draw(frame, session.runtime.renderer()))?;

        if !event::poll(TICK)? {
            continue;
        }
        let TermEvent::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        match session.runtime.renderer_mut().on_key(key.code) {
            Some(Action::Mount(volume_id)) => {
                session.runtime.handle(Event::UserRequestsMount { volume_id })
            }
            Some(Action::Reload) => session.runtime.handle(Event::UserRequestsReload),
            Some(Action::Reset) => reset(session, config),
            Some(Action::Quit) => return Ok(()),
            None => {}
        }
    }
}

/// A hard failure came from the environment probe, so resetting it means
/// probing again with a fresh session. Soft failures reset in place.
fn reset(session: &mut Session, config: &Config) {
    if matches!(session.runtime.state().phase, Phase::HardFailed(_)) {
        info!("re-running environment check");
        let previous = std::mem::replace(session, Session::start(config));
        previous.stop();
    } else {
        session.runtime.handle(Event::Reset);
    }
}
