use futures::channel::mpsc as frames;
use futures::future::{self, BoxFuture};
use futures::{FutureExt, SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use super::{Connection, Transport, TransportError};

/// In-process transport. Every `connect` hands the server side of a fresh
/// channel pair to the paired `MemoryServer`, which plays the remote end.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    accepted: mpsc::UnboundedSender<MemoryPeer>,
}

/// Accepts connections opened through a `MemoryTransport`
#[derive(Debug)]
pub struct MemoryServer {
    incoming: mpsc::UnboundedReceiver<MemoryPeer>,
}

/// Server side of one in-memory connection
#[derive(Debug)]
pub struct MemoryPeer {
    url: Url,
    to_client: frames::UnboundedSender<Result<String, TransportError>>,
    from_client: frames::UnboundedReceiver<String>,
}

impl MemoryTransport {
    pub fn new() -> (Self, MemoryServer) {
        let (accepted, incoming) = mpsc::unbounded_channel();
        (Self { accepted }, MemoryServer { incoming })
    }
}

impl Transport for MemoryTransport {
    fn connect(&self, url: &Url) -> BoxFuture<'static, Result<Connection, TransportError>> {
        let (to_client, client_inbox) = frames::unbounded();
        let (client_outbox, from_client) = frames::unbounded();
        let peer = MemoryPeer {
            url: url.clone(),
            to_client,
            from_client,
        };

        let result = match self.accepted.send(peer) {
            Ok(()) => Ok(Connection {
                sink: Box::pin(client_outbox.sink_map_err(|_| TransportError::Closed)),
                stream: Box::pin(client_inbox),
            }),
            Err(_) => Err(TransportError::Connect {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            }),
        };
        future::ready(result).boxed()
    }
}

impl MemoryServer {
    /// Wait for the next connection
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.recv().await
    }

    /// Take a connection that is already established, if any
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.incoming.try_recv().ok()
    }
}

impl MemoryPeer {
    /// URL the client connected to
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Send a raw text frame to the client
    pub fn send(&self, frame: impl Into<String>) -> bool {
        self.to_client.unbounded_send(Ok(frame.into())).is_ok()
    }

    /// Send a JSON value to the client
    pub fn send_json(&self, value: Value) -> bool {
        self.send(value.to_string())
    }

    /// Deliver a socket error to the client
    pub fn fail(&self, error: TransportError) -> bool {
        self.to_client.unbounded_send(Err(error)).is_ok()
    }

    /// Wait for the next frame from the client; `None` once the client closed
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.next().await
    }

    /// Next frame parsed as JSON
    pub async fn recv_json(&mut self) -> Option<Value> {
        let frame = self.recv().await?;
        serde_json::from_str(&frame).ok()
    }

    /// Take a frame that already arrived, if any
    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.next().now_or_never().flatten()
    }

    /// Close the connection from the server side
    pub fn close(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_url() -> Url {
        Url::parse("ws://localhost/ws?path=a.py").unwrap()
    }

    #[tokio::test]
    async fn connect_hands_peer_to_server() {
        let (transport, mut server) = MemoryTransport::new();

        let connection = transport.connect(&test_url()).await.unwrap();
        let peer = server.try_accept().unwrap();
        assert_eq!(peer.url().as_str(), "ws://localhost/ws?path=a.py");
        drop(connection);
    }

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (transport, mut server) = MemoryTransport::new();
        let Connection {
            mut sink,
            mut stream,
        } = transport.connect(&test_url()).await.unwrap();
        let mut peer = server.accept().await.unwrap();

        sink.send("ping".to_string()).await.unwrap();
        assert_eq!(peer.recv().await.as_deref(), Some("ping"));

        assert!(peer.send("pong"));
        assert_eq!(stream.next().await, Some(Ok("pong".to_string())));
    }

    #[tokio::test]
    async fn closing_peer_ends_client_stream() {
        let (transport, mut server) = MemoryTransport::new();
        let Connection { mut stream, .. } = transport.connect(&test_url()).await.unwrap();
        let peer = server.accept().await.unwrap();

        peer.close();
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn connect_fails_without_server() {
        let (transport, server) = MemoryTransport::new();
        drop(server);

        let result = transport.connect(&test_url()).await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
