use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use super::queue::{SharedQueue, lock};
use crate::protocol::OutboundCommand;
use crate::transport::{Connection, Transport, TransportError};

/// Per-variant behavior of the socket task
pub(crate) trait SessionProtocol: Send + 'static {
    type Command: OutboundCommand + Send + 'static;
    type Event: Send + 'static;

    fn decode(frame: &str) -> Self::Event;

    /// Whether the event announces the end of the session
    fn is_final(event: &Self::Event) -> bool;

    /// Event to report when the socket could not be opened or failed
    fn transport_failed(error: &TransportError) -> Option<Self::Event>;

    /// Event to report when the server closed before a final event
    fn closed_early() -> Option<Self::Event>;
}

enum Ending {
    /// The controller closed its queue
    Local,
    /// The server closed the socket
    Remote,
    Failed(TransportError),
}

/// Spawn the socket task of one session: connect, flush the queue with the
/// start command in front, then pump frames both ways until either side
/// closes. Every inbound frame is decoded and handed to `on_event`.
pub(crate) fn spawn<P, F>(
    transport: Arc<dyn Transport>,
    url: Url,
    start: P::Command,
    queue: SharedQueue<P::Command>,
    mut on_event: F,
) -> JoinHandle<()>
where
    P: SessionProtocol,
    F: FnMut(P::Event) + Send + 'static,
{
    tokio::spawn(async move {
        let Connection {
            mut sink,
            mut stream,
        } = match transport.connect(&url).await {
            Ok(connection) => connection,
            Err(err) => {
                warn!(%url, error = %err, "session could not connect");
                lock(&queue).close();
                if let Some(event) = P::transport_failed(&err) {
                    on_event(event);
                }
                return;
            }
        };

        let (writer, mut outbound) = mpsc::unbounded_channel();
        {
            let mut queue = lock(&queue);
            queue.enqueue(start);
            let flushed = queue.open(writer);
            info!(%url, flushed, "session open");
        }

        let mut finished = false;
        let ending = loop {
            tokio::select! {
                frame = outbound.recv() => match frame {
                    Some(frame) => {
                        if let Err(err) = sink.send(frame).await {
                            break Ending::Failed(err);
                        }
                    }
                    None => break Ending::Local,
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(frame)) => {
                        let event = P::decode(&frame);
                        finished |= P::is_final(&event);
                        on_event(event);
                    }
                    Some(Err(err)) => break Ending::Failed(err),
                    None => break Ending::Remote,
                },
            }
        };

        lock(&queue).close();
        match ending {
            Ending::Local => debug!(%url, "session closed locally"),
            Ending::Remote => {
                info!(%url, finished, "session closed by server");
                if !finished {
                    if let Some(event) = P::closed_early() {
                        on_event(event);
                    }
                }
            }
            Ending::Failed(err) => {
                warn!(%url, error = %err, "session socket failed");
                if let Some(event) = P::transport_failed(&err) {
                    on_event(event);
                }
            }
        }
        if let Err(err) = sink.close().await {
            debug!(%url, error = %err, "socket close failed");
        }
    })
}
