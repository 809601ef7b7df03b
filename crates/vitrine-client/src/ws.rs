//! WebSocket connector
//!
//! Opens the subscription socket with `tokio-tungstenite`, offering the
//! `graphql-transport-ws` subprotocol. Text frames pass through; binary
//! frames are dropped and a close frame ends the stream. Control frames
//! are answered by tungstenite itself.

use crate::error::SubscriptionError;
use crate::subscription::{Connector, FrameSink, FrameStream};
use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

/// Subprotocol spoken on the socket
pub const GRAPHQL_TRANSPORT_WS: &str = "graphql-transport-ws";

/// [`Connector`] for `ws://` and `wss://` endpoints
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    /// Create connector
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), SubscriptionError> {
        let mut request = url
            .into_client_request()
            .map_err(|err| SubscriptionError::Connect(err.to_string()))?;
        request.headers_mut().insert(
            "Sec-WebSocket-Protocol",
            HeaderValue::from_static(GRAPHQL_TRANSPORT_WS),
        );

        let (socket, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|err| SubscriptionError::Connect(err.to_string()))?;
        tracing::debug!(url, status = %response.status(), "subscription socket connected");

        let (write, read) = socket.split();
        let sink: FrameSink = Box::pin(
            write
                .sink_map_err(|err| SubscriptionError::Socket(err.to_string()))
                .with(|frame: String| future::ready(Ok::<_, SubscriptionError>(Message::Text(frame)))),
        );
        let stream: FrameStream = Box::pin(
            read.take_while(|message| future::ready(!matches!(message, Ok(Message::Close(_)))))
                .filter_map(|message| {
                    future::ready(match message {
                        Ok(Message::Text(text)) => Some(Ok(text)),
                        Ok(_) => None,
                        Err(err) => Some(Err(SubscriptionError::Socket(err.to_string()))),
                    })
                }),
        );
        Ok((sink, stream))
    }
}
