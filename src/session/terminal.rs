use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use super::driver::{self, SessionProtocol};
use super::queue::{OutboundQueue, SharedQueue, lock};
use crate::protocol::{TerminalCommand, TerminalEvent, decode_terminal};
use crate::transport::{Transport, TransportError};

pub(crate) struct TerminalProtocol;

impl SessionProtocol for TerminalProtocol {
    type Command = TerminalCommand;
    type Event = TerminalEvent;

    fn decode(frame: &str) -> TerminalEvent {
        decode_terminal(frame)
    }

    fn is_final(event: &TerminalEvent) -> bool {
        matches!(event, TerminalEvent::SessionEnd)
    }

    // Socket loss ends the shell session as far as the caller can tell
    fn transport_failed(_error: &TransportError) -> Option<TerminalEvent> {
        Some(TerminalEvent::SessionEnd)
    }

    fn closed_early() -> Option<TerminalEvent> {
        Some(TerminalEvent::SessionEnd)
    }
}

/// Strip leading slashes so the directory is relative to the workspace root
pub fn normalize_cwd(cwd: &str) -> String {
    cwd.trim().trim_start_matches(['/', '\\']).to_string()
}

/// Controller of one interactive terminal session
pub struct TerminalController {
    cwd: String,
    queue: SharedQueue<TerminalCommand>,
    task: JoinHandle<()>,
}

impl TerminalController {
    /// Open a terminal at `url`. Output chunks go to `on_data`; `on_exit`
    /// runs once when the remote shell ends or the socket is lost.
    /// It does not run when the session is closed locally.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open<D, X>(
        transport: Arc<dyn Transport>,
        url: Url,
        cwd: impl Into<String>,
        mut on_data: D,
        on_exit: X,
    ) -> Self
    where
        D: FnMut(String) + Send + 'static,
        X: FnOnce() + Send + 'static,
    {
        let mut on_exit = Some(on_exit);
        let queue = OutboundQueue::shared();
        let task = driver::spawn::<TerminalProtocol, _>(
            transport,
            url,
            TerminalCommand::Start,
            Arc::clone(&queue),
            move |event| match event {
                TerminalEvent::Data(text) => on_data(text),
                TerminalEvent::SessionEnd => {
                    if let Some(exit) = on_exit.take() {
                        exit();
                    }
                }
                TerminalEvent::Malformed => warn!("ignoring malformed terminal frame"),
                TerminalEvent::Unknown { kind, .. } => {
                    debug!(%kind, "ignoring unknown terminal event")
                }
            },
        );
        Self {
            cwd: cwd.into(),
            queue,
            task,
        }
    }

    /// Working directory, relative to the workspace root
    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    /// Whether the socket is open. Input sent before that is queued, which
    /// callers may want to avoid during a slow connect.
    pub fn ready(&self) -> bool {
        lock(&self.queue).is_open()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn send(&self, data: impl Into<String>) {
        self.enqueue(TerminalCommand::Stdin { data: data.into() });
    }

    pub fn resize(&self, rows: u16, cols: u16) {
        self.enqueue(TerminalCommand::Resize { rows, cols });
    }

    pub fn interrupt(&self) {
        self.enqueue(TerminalCommand::Interrupt);
    }

    pub fn terminate(&self) {
        self.enqueue(TerminalCommand::Terminate);
    }

    /// End the session locally. Frames already sent are still written.
    pub fn close(&self) {
        lock(&self.queue).close();
    }

    fn enqueue(&self, command: TerminalCommand) {
        lock(&self.queue).enqueue(command);
    }
}

impl Drop for TerminalController {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TerminalController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalController")
            .field("cwd", &self.cwd)
            .field("ready", &self.ready())
            .finish()
    }
}
