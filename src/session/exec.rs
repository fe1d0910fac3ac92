use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use url::Url;

use super::driver::{self, SessionProtocol};
use super::queue::{OutboundQueue, SharedQueue, lock};
use crate::protocol::{ErrorEvent, ExecCommand, ExecEvent, StartOptions, decode_exec};
use crate::transport::{Transport, TransportError};

/// Message of the `error` event raised when the socket closes before `run_end`
pub const CONNECTION_CLOSED: &str = "Connection closed";

pub(crate) struct ExecProtocol;

impl SessionProtocol for ExecProtocol {
    type Command = ExecCommand;
    type Event = ExecEvent;

    fn decode(frame: &str) -> ExecEvent {
        decode_exec(frame)
    }

    fn is_final(event: &ExecEvent) -> bool {
        event.is_run_end()
    }

    fn transport_failed(error: &TransportError) -> Option<ExecEvent> {
        Some(ExecEvent::Error(ErrorEvent::new(error.to_string())))
    }

    fn closed_early() -> Option<ExecEvent> {
        Some(ExecEvent::Error(ErrorEvent::new(CONNECTION_CLOSED)))
    }
}

/// Controller of one execution session (script, notebook or flow run).
///
/// Each command method maps to exactly one outbound command. Commands issued
/// before the socket opens are buffered; after it closes they are dropped.
/// Inbound events go, undecorated, to the callback given at construction.
/// Dropping the controller closes the socket once queued frames are written.
pub struct ExecController {
    path: String,
    queue: SharedQueue<ExecCommand>,
    task: JoinHandle<()>,
}

impl ExecController {
    /// Open a session for `path` at `url`. The `start` command carrying
    /// `options` is sent as soon as the socket opens.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open<F>(
        transport: Arc<dyn Transport>,
        url: Url,
        path: impl Into<String>,
        options: StartOptions,
        on_event: F,
    ) -> Self
    where
        F: FnMut(ExecEvent) + Send + 'static,
    {
        let queue = OutboundQueue::shared();
        let task = driver::spawn::<ExecProtocol, _>(
            transport,
            url,
            ExecCommand::Start(options),
            Arc::clone(&queue),
            on_event,
        );
        Self {
            path: path.into(),
            queue,
            task,
        }
    }

    /// Path of the file this session runs
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the socket is currently open
    pub fn is_open(&self) -> bool {
        lock(&self.queue).is_open()
    }

    /// Whether the socket task has ended
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn stdin(&self, text: impl Into<String>) {
        self.send(ExecCommand::Stdin {
            text: text.into(),
            request_id: None,
        });
    }

    /// Stdin tagged with a request id, echoed back by `run_stdin_ack`
    pub fn stdin_with_id(&self, text: impl Into<String>, request_id: impl Into<String>) {
        self.send(ExecCommand::Stdin {
            text: text.into(),
            request_id: Some(request_id.into()),
        });
    }

    pub fn stdin_eof(&self) {
        self.send(ExecCommand::StdinEof);
    }

    pub fn interrupt(&self) {
        self.send(ExecCommand::Interrupt);
    }

    pub fn terminate(&self) {
        self.send(ExecCommand::Terminate);
    }

    pub fn kill(&self) {
        self.send(ExecCommand::Kill);
    }

    pub fn shutdown(&self) {
        self.send(ExecCommand::Shutdown);
    }

    /// Same as `shutdown`
    pub fn close(&self) {
        self.shutdown();
    }

    /// Answer a notebook `input_request`
    pub fn input_reply(&self, value: impl Into<String>) {
        self.send(ExecCommand::InputReply {
            value: value.into(),
        });
    }

    /// Restart the notebook kernel
    pub fn restart(&self) {
        self.send(ExecCommand::Restart);
    }

    /// Answer a prompt raised by a flow run; `payload` is sent as-is
    pub fn waldiez_respond(&self, payload: Value) {
        self.send(ExecCommand::WaldiezRespond { payload });
    }

    pub fn waldiez_control(&self, payload: Value) {
        self.send(ExecCommand::WaldiezControl { payload });
    }

    fn send(&self, command: ExecCommand) {
        lock(&self.queue).enqueue(command);
    }
}

impl Drop for ExecController {
    fn drop(&mut self) {
        lock(&self.queue).close();
    }
}

impl std::fmt::Debug for ExecController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecController")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .finish()
    }
}
