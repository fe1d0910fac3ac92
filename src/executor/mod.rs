// Execution state: the single active run, its line history and the
// listeners that observe it

pub mod dedup;
pub mod history;
pub mod listeners;

use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tracing::{debug, info};

pub use dedup::{DEFAULT_DEDUP_CAPACITY, DedupWindow, correlation_id};
pub use history::{Line, LineHistory, LineKind};
pub use listeners::{ListenerHandle, ListenerRegistry, RunListener};

use crate::config::Config;
use crate::protocol::{ExecEvent, StartOptions};
use crate::session::{ExecController, SessionFactory};
use crate::transport::Transport;

/// Sequence number of a run, used to tell its events from a previous run's
pub type RunId = u64;

enum RunMessage {
    Event(RunId, ExecEvent),
    /// The socket task of the run is gone; no further events will arrive
    Ended(RunId),
}

/// Sends `Ended` once the event callback owning it is dropped
struct EndNotice {
    run: RunId,
    tx: mpsc::UnboundedSender<RunMessage>,
}

impl EndNotice {
    fn publish(&self, event: ExecEvent) {
        let _ = self.tx.send(RunMessage::Event(self.run, event));
    }
}

impl Drop for EndNotice {
    fn drop(&mut self) {
        let _ = self.tx.send(RunMessage::Ended(self.run));
    }
}

struct ActiveRun {
    id: RunId,
    controller: ExecController,
    started_at: DateTime<Local>,
    session_ended: bool,
}

/// Owns at most one execution session at a time.
///
/// Events published by the session are processed by [`Executor::pump`] or
/// [`Executor::next_event`]: each one is turned into history lines and then
/// fanned out to every listener. Events of a run that is no longer active are
/// dropped.
pub struct Executor {
    sessions: SessionFactory,
    active: Option<ActiveRun>,
    target_path: Option<String>,
    history: LineHistory,
    dedup: DedupWindow,
    listeners: ListenerRegistry,
    events_tx: mpsc::UnboundedSender<RunMessage>,
    events_rx: mpsc::UnboundedReceiver<RunMessage>,
    next_run: RunId,
}

impl Executor {
    pub fn new(sessions: SessionFactory, dedup_capacity: usize) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            sessions,
            active: None,
            target_path: None,
            history: LineHistory::new(),
            dedup: DedupWindow::new(dedup_capacity),
            listeners: ListenerRegistry::new(),
            events_tx,
            events_rx,
            next_run: 1,
        }
    }

    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> anyhow::Result<Self> {
        let sessions = SessionFactory::new(config.endpoints()?, transport);
        Ok(Self::new(sessions, config.dedup_capacity))
    }

    /// Start a run of `path`. An active run is stopped first, so its
    /// controller is gone before the new one exists. The line history is
    /// reset; the dedup window is not.
    ///
    /// Must be called from within a tokio runtime.
    pub fn run(&mut self, path: &str, options: StartOptions) -> RunId {
        self.stop();
        self.history.clear();

        let id = self.next_run;
        self.next_run += 1;

        let notice = EndNotice {
            run: id,
            tx: self.events_tx.clone(),
        };
        let controller = self.sessions.open_exec(
            path,
            move |event| notice.publish(event),
            options,
        );

        info!(run = id, path, "run started");
        self.target_path = Some(path.to_string());
        self.active = Some(ActiveRun {
            id,
            controller,
            started_at: Local::now(),
            session_ended: false,
        });
        id
    }

    /// Send `shutdown` to the active run and let go of its controller.
    /// Does nothing when no run is active.
    pub fn stop(&mut self) {
        if let Some(run) = self.active.take() {
            info!(run = run.id, path = run.controller.path(), "run stopped");
            run.controller.shutdown();
        }
    }

    /// Empty the line history and forget every seen correlation id
    pub fn clear(&mut self) {
        self.history.clear();
        self.dedup.clear();
    }

    /// Register a listener for the events of every run; drop it again
    /// through the returned handle
    pub fn add_listener(&self, listener: impl RunListener + 'static) -> ListenerHandle {
        self.listeners.add(listener)
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Process every event already received, without waiting.
    /// Returns the number of events applied.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(message) = self.events_rx.try_recv() {
            if self.apply(message).is_some() {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for the next event of the active run and process it.
    ///
    /// Returns `None` once no run is active, or when the session of the
    /// active run closed without a `run_end` (the run then stays active
    /// until [`Executor::stop`]).
    pub async fn next_event(&mut self) -> Option<ExecEvent> {
        loop {
            let run = self.active.as_ref()?;
            if run.session_ended {
                return None;
            }
            let message = self.events_rx.recv().await?;
            if let Some(event) = self.apply(message) {
                return Some(event);
            }
        }
    }

    fn apply(&mut self, message: RunMessage) -> Option<ExecEvent> {
        match message {
            RunMessage::Event(id, event) => self.handle_event(id, &event).then_some(event),
            RunMessage::Ended(id) => {
                if let Some(run) = self.active.as_mut().filter(|run| run.id == id) {
                    debug!(run = id, "session of active run ended");
                    run.session_ended = true;
                }
                None
            }
        }
    }

    /// Record one event of run `id` and fan it out. Returns false when the
    /// run is not the active one and the event was dropped.
    pub fn handle_event(&mut self, id: RunId, event: &ExecEvent) -> bool {
        if self.active.as_ref().map(|run| run.id) != Some(id) {
            debug!(run = id, kind = event.kind(), "dropping event of inactive run");
            return false;
        }
        self.record(event);
        self.listeners.dispatch(event);
        true
    }

    fn record(&mut self, event: &ExecEvent) {
        match event {
            ExecEvent::RunStdout(out) => {
                if self.dedup.admit(&out.text) {
                    self.history.push(Line::new(LineKind::Stdout, out.text.as_str()));
                } else {
                    debug!("duplicate stdout line suppressed");
                }
            }
            ExecEvent::RunStderr(err) => {
                self.history.push(Line::new(LineKind::Stderr, err.text.as_str()));
            }
            ExecEvent::Error(err) => {
                self.history.push(Line::new(LineKind::Stderr, err.message.as_str()));
            }
            ExecEvent::RunStatus(status) => {
                self.history.push(Line::new(LineKind::System, status.summary()));
            }
            ExecEvent::RunEnd(end) => {
                self.history.push(Line::new(LineKind::System, end.summary()));
                if let Some(run) = self.active.take() {
                    info!(run = run.id, status = %end.status, "run ended");
                }
            }
            _ => {}
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Path of the most recent run, kept after it ends
    pub fn target_path(&self) -> Option<&str> {
        self.target_path.as_deref()
    }

    pub fn started_at(&self) -> Option<DateTime<Local>> {
        self.active.as_ref().map(|run| run.started_at)
    }

    /// Session of the active run, for stdin and signals
    pub fn controller(&self) -> Option<&ExecController> {
        self.active.as_ref().map(|run| &run.controller)
    }

    pub fn run_id(&self) -> Option<RunId> {
        self.active.as_ref().map(|run| run.id)
    }

    pub fn lines(&self) -> &[Line] {
        self.history.lines()
    }

    pub fn history(&self) -> &LineHistory {
        &self.history
    }

    pub fn dedup(&self) -> &DedupWindow {
        &self.dedup
    }

    /// Teardown hook: stop the active run and drop all listeners
    pub fn shutdown(mut self) {
        self.stop();
        self.listeners.clear();
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("running", &self.is_running())
            .field("target_path", &self.target_path)
            .field("lines", &self.history.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
