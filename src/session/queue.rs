use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::protocol::{OutboundCommand, encode};

/// Outbound queue shared between a controller and its socket task
pub type SharedQueue<C> = Arc<Mutex<OutboundQueue<C>>>;

/// Lock a shared queue. A panic while holding the lock cannot leave the
/// queue half-updated, so a poisoned lock is simply taken over.
pub fn lock<C>(queue: &SharedQueue<C>) -> MutexGuard<'_, OutboundQueue<C>> {
    queue.lock().unwrap_or_else(PoisonError::into_inner)
}

enum QueueState<C> {
    /// Socket not open yet; commands wait here in submission order
    Pending(Vec<C>),
    /// Socket open; frames go straight to the writer
    Open(mpsc::UnboundedSender<String>),
    Closed,
}

/// Buffers commands until the socket opens, then writes them in order,
/// with any `start` command promoted to the front.
pub struct OutboundQueue<C> {
    state: QueueState<C>,
}

impl<C: OutboundCommand> OutboundQueue<C> {
    pub fn new() -> Self {
        Self {
            state: QueueState::Pending(Vec::new()),
        }
    }

    pub fn shared() -> SharedQueue<C> {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Buffer or send a command. Commands issued after close are dropped.
    pub fn enqueue(&mut self, command: C) {
        match &mut self.state {
            QueueState::Pending(buffer) => buffer.push(command),
            QueueState::Open(writer) => {
                if !write_frame(writer, &command) {
                    self.state = QueueState::Closed;
                }
            }
            QueueState::Closed => debug!(?command, "dropping command on closed session"),
        }
    }

    /// Mark the socket open and flush everything buffered so far.
    /// Returns the number of commands flushed; does nothing unless pending.
    pub fn open(&mut self, writer: mpsc::UnboundedSender<String>) -> usize {
        let QueueState::Pending(buffer) = &mut self.state else {
            return 0;
        };
        let mut buffered = std::mem::take(buffer);
        if let Some(position) = buffered.iter().position(C::is_start) {
            let start = buffered.remove(position);
            buffered.insert(0, start);
        }

        let flushed = buffered.len();
        for command in &buffered {
            if !write_frame(&writer, command) {
                self.state = QueueState::Closed;
                return flushed;
            }
        }
        self.state = QueueState::Open(writer);
        flushed
    }

    /// Stop accepting commands. Frames already handed to the writer still go
    /// out; anything still buffered is discarded.
    pub fn close(&mut self) {
        if let QueueState::Pending(buffer) = &self.state {
            if !buffer.is_empty() {
                debug!(discarded = buffer.len(), "closing session before it opened");
            }
        }
        self.state = QueueState::Closed;
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, QueueState::Open(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, QueueState::Closed)
    }

    /// Number of commands waiting for the socket to open
    pub fn pending(&self) -> usize {
        match &self.state {
            QueueState::Pending(buffer) => buffer.len(),
            _ => 0,
        }
    }
}

impl<C: OutboundCommand> Default for OutboundQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns false once the writer is gone
fn write_frame<C: OutboundCommand>(writer: &mpsc::UnboundedSender<String>, command: &C) -> bool {
    match encode(command) {
        Ok(frame) => writer.send(frame).is_ok(),
        Err(err) => {
            warn!(error = %err, ?command, "failed to encode command");
            true
        }
    }
}
