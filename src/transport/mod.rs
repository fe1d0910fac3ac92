// Socket transports for sessions
// A transport turns a URL into a duplex of JSON text frames

pub mod memory;
pub mod ws;

use std::pin::Pin;

use futures::future::BoxFuture;
use futures::{Sink, Stream};
use url::Url;

pub use memory::{MemoryPeer, MemoryServer, MemoryTransport};
pub use ws::WsTransport;

/// Failure of the underlying socket
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },
    #[error("socket error: {0}")]
    Socket(String),
    #[error("connection closed")]
    Closed,
}

/// Outgoing half of an open connection
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Incoming half of an open connection; ends when the peer closes
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// An open connection, split into its two directions
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens connections for sessions
pub trait Transport: Send + Sync + 'static {
    fn connect(&self, url: &Url) -> BoxFuture<'static, Result<Connection, TransportError>>;
}
