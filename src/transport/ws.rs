use futures::future::{self, BoxFuture};
use futures::{FutureExt, SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::debug;
use url::Url;

use super::{Connection, Transport, TransportError};

/// WebSocket transport. Text frames carry the protocol; binary, ping and
/// pong frames are ignored (tungstenite answers pings itself).
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl Transport for WsTransport {
    fn connect(&self, url: &Url) -> BoxFuture<'static, Result<Connection, TransportError>> {
        let url = url.to_string();
        async move {
            let (socket, _response) =
                connect_async(url.as_str())
                    .await
                    .map_err(|err| TransportError::Connect {
                        url: url.clone(),
                        reason: err.to_string(),
                    })?;
            debug!(%url, "websocket connected");

            let (sink, stream) = socket.split();
            let sink = sink
                .with(|frame: String| future::ready(Ok::<_, WsError>(Message::Text(frame.into()))))
                .sink_map_err(|err| TransportError::Socket(err.to_string()));
            let stream = stream.filter_map(|message| {
                future::ready(match message {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(_) => None,
                    Err(WsError::ConnectionClosed) => None,
                    Err(err) => Some(Err(TransportError::Socket(err.to_string()))),
                })
            });

            Ok(Connection {
                sink: Box::pin(sink),
                stream: Box::pin(stream),
            })
        }
        .boxed()
    }
}
