//! Drives a [`SessionController`]: runs its tasks on worker threads and feeds
//! completions back through a channel.
//!
//! Every event, whether it comes from the watcher thread, the UI or a worker,
//! is funnelled through one [`mpsc`] channel and applied on the thread that
//! owns the [`Runtime`]. State is therefore only ever touched serially.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::directory::VolumeDirectory;
use crate::error::Error;
use crate::mount::{self, MountExecutor};
use crate::projector::{self, Projection, ProjectorOptions};
use crate::session::{Event, SessionController, SessionState, Task};

/// Receives a fresh [`Projection`] after every state change.
pub trait Render {
    fn render(&mut self, projection: &Projection);
}

/// Cloneable handle for posting events to a [`Runtime`] from any thread.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<Event>,
}

impl EventSender {
    /// Posts `event`. Returns false once the runtime has been dropped.
    pub fn send(&self, event: Event) -> bool {
        self.tx.send(event).is_ok()
    }
}

pub struct Runtime<R> {
    controller: SessionController,
    directory: Arc<dyn VolumeDirectory>,
    executor: Arc<dyn MountExecutor>,
    mount_root: PathBuf,
    options: ProjectorOptions,
    renderer: R,
    tx: Sender<Event>,
    rx: Receiver<Event>,
    in_flight: Option<&'static str>,
}

impl<R: Render> Runtime<R> {
    pub fn new(
        directory: Arc<dyn VolumeDirectory>,
        executor: Arc<dyn MountExecutor>,
        renderer: R,
        config: &Config,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            controller: SessionController::new(),
            directory,
            executor,
            mount_root: config.mount_root.clone(),
            options: ProjectorOptions {
                always_show: config.always_show,
            },
            renderer,
            tx,
            rx,
            in_flight: None,
        }
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    pub fn state(&self) -> &SessionState {
        self.controller.state()
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// Whether a background task is outstanding.
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Applies one event, starts whatever task it unlocks, and re-renders.
    pub fn handle(&mut self, event: Event) {
        if event.is_completion() {
            self.in_flight = None;
        }
        if let Some(task) = self.controller.handle(event) {
            self.dispatch(task);
        }
        self.render();
    }

    /// Starts the next task if the session is idle. Call once at startup.
    pub fn advance(&mut self) {
        if let Some(task) = self.controller.advance() {
            self.dispatch(task);
        }
        self.render();
    }

    /// Handles every event already queued. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.rx.try_recv() {
            self.handle(event);
            handled += 1;
        }
        handled
    }

    /// Blocks up to `timeout` for one event, then drains the queue.
    /// Returns how many events were handled.
    pub fn wait(&mut self, timeout: Duration) -> usize {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => {
                self.handle(event);
                1 + self.pump()
            }
            Err(RecvTimeoutError::Timeout) => 0,
            // We hold a sender ourselves, so the channel never disconnects.
            Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    fn render(&mut self) {
        let projection = projector::project(self.controller.state(), &self.options);
        self.renderer.render(&projection);
    }

    fn dispatch(&mut self, task: Task) {
        debug_assert!(
            self.in_flight.is_none(),
            "task started while another is in flight"
        );

        let kind = task.kind();
        info!(task = kind, "starting background task");
        self.in_flight = Some(kind);

        let directory = Arc::clone(&self.directory);
        let executor = Arc::clone(&self.executor);
        let mount_root = self.mount_root.clone();
        let tx = self.tx.clone();
        let job = task.clone();

        let spawned = thread::Builder::new()
            .name(format!("ntfsmount-{}", kind))
            .spawn(move || {
                let event = run_task(job, directory.as_ref(), executor.as_ref(), &mount_root);
                if tx.send(event).is_err() {
                    debug!("runtime dropped before task completed");
                }
            });

        if let Err(source) = spawned {
            warn!(task = kind, error = %source, "failed to spawn worker");
            let error = Error::WorkerSpawn {
                task: kind.to_string(),
                source,
            };
            // Delivered through the queue so the completion is handled like
            // any other.
            if self.tx.send(task.failed(error)).is_err() {
                debug!("event queue closed, dropping spawn failure");
            }
        }
    }
}

/// Performs `task` and returns its completion event. Runs on a worker.
fn run_task(
    task: Task,
    directory: &dyn VolumeDirectory,
    executor: &dyn MountExecutor,
    mount_root: &Path,
) -> Event {
    match task {
        Task::ReloadAll => Event::ReloadFinished(directory.list_volumes()),
        Task::Resolve { target } => Event::ResolveFinished(directory.resolve_volume(&target)),
        Task::Mount {
            volume,
            destination,
        } => {
            let outcome = mount::mount_volume(
                executor,
                &volume,
                destination.as_deref(),
                mount_root,
                &mut (),
            );
            Event::MountFinished { volume, outcome }
        }
    }
}
