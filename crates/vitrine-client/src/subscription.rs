//! Subscription channel
//!
//! One long-lived socket per endpoint URL carries every named subscription
//! (`graphql-transport-ws` framing). Each [`SubscriptionStream`] is one
//! `subscribe` on the shared socket; dropping it sends `complete`.
//!
//! - [`Connector`] opens the socket as a text frame sink/stream pair
//!   ([`WsConnector`](crate::ws::WsConnector) in production)
//! - [`SubscriptionPool`] keeps one [`SubscriptionChannel`] per URL
//! - [`SubscriptionRegistry`] forwards events of named operations into the
//!   store through their updaters

use crate::error::SubscriptionError;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use ulid::Ulid;
use vitrine_mutation::{GraphQlError, GraphQlResponse, OperationDescriptor, PersistedQueryMap};
use vitrine_store::{DataId, NormalizeOptions, Store, Updater};

/// Time allowed for `connection_ack`
pub const ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Outgoing text frames
pub type FrameSink = Pin<Box<dyn Sink<String, Error = SubscriptionError> + Send>>;

/// Incoming text frames
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, SubscriptionError>> + Send>>;

/// `graphql-transport-ws` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Client hello
    ConnectionInit {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Server accepted the connection
    ConnectionAck {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Keepalive request
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Keepalive answer
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Start an operation
    Subscribe {
        id: String,
        payload: Value,
    },
    /// Operation result
    Next {
        id: String,
        payload: GraphQlResponse,
    },
    /// Operation failed
    Error {
        id: String,
        payload: Vec<GraphQlError>,
    },
    /// Operation finished (either side)
    Complete {
        id: String,
    },
}

impl WsMessage {
    /// Parse a text frame
    ///
    /// # Errors
    /// Returns `SubscriptionError::Protocol` for unknown or malformed frames
    pub fn decode(frame: &str) -> Result<Self, SubscriptionError> {
        serde_json::from_str(frame).map_err(|err| SubscriptionError::Protocol(err.to_string()))
    }

    /// Render as a text frame
    ///
    /// # Errors
    /// Returns `SubscriptionError::Protocol` if rendering fails
    pub fn encode(&self) -> Result<String, SubscriptionError> {
        serde_json::to_string(self).map_err(|err| SubscriptionError::Protocol(err.to_string()))
    }
}

/// Opens subscription sockets
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `url`
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), SubscriptionError>;
}

type EventSender = mpsc::UnboundedSender<Result<GraphQlResponse, SubscriptionError>>;

struct ActiveSubscription {
    operation: String,
    sender: EventSender,
}

struct ChannelInner {
    url: String,
    outgoing: parking_lot::Mutex<Option<mpsc::UnboundedSender<WsMessage>>>,
    active: DashMap<String, ActiveSubscription>,
    closed: AtomicBool,
    shutdown: Notify,
}

impl ChannelInner {
    fn send(&self, message: WsMessage) -> Result<(), SubscriptionError> {
        match self.outgoing.lock().as_ref() {
            Some(outgoing) => outgoing.send(message).map_err(|_| SubscriptionError::Closed),
            None => Err(SubscriptionError::Closed),
        }
    }

    fn deliver(&self, id: &str, event: Result<GraphQlResponse, SubscriptionError>) {
        let gone = match self.active.get(id) {
            Some(entry) => entry.sender.send(event).is_err(),
            None => {
                tracing::trace!(id, "event for unknown subscription");
                false
            }
        };
        if gone {
            self.active.remove(id);
        }
    }

    fn finish(&self, id: &str, last: Option<Result<GraphQlResponse, SubscriptionError>>) {
        if let Some((_, entry)) = self.active.remove(id) {
            if let Some(event) = last {
                let _ = entry.sender.send(event);
            }
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.outgoing.lock().take();
        let ids: Vec<String> = self.active.iter().map(|entry| entry.key().clone()).collect();
        for id in ids {
            self.finish(&id, Some(Err(SubscriptionError::Closed)));
        }
        tracing::debug!(url = %self.url, "subscription channel closed");
    }
}

/// Shared socket multiplexing named subscriptions
///
/// Operations found in the persisted map are sent by id, the rest as text
/// unless strict mode is on.
#[derive(Clone)]
pub struct SubscriptionChannel {
    inner: Arc<ChannelInner>,
    persisted: Arc<PersistedQueryMap>,
    strict: bool,
}

impl SubscriptionChannel {
    /// Open the socket and complete the `connection_init` handshake
    ///
    /// # Errors
    /// - `SubscriptionError::Connect` if the connector fails
    /// - `SubscriptionError::NotAcknowledged` if the server does not ack in time
    pub async fn connect(
        connector: &dyn Connector,
        url: &str,
        init_payload: Option<Value>,
    ) -> Result<Self, SubscriptionError> {
        let (mut sink, mut stream) = connector.connect(url).await?;

        sink.send(WsMessage::ConnectionInit { payload: init_payload }.encode()?)
            .await?;
        match tokio::time::timeout(ACK_TIMEOUT, stream.next()).await {
            Ok(Some(Ok(frame))) => match WsMessage::decode(&frame)? {
                WsMessage::ConnectionAck { .. } => {}
                other => {
                    return Err(SubscriptionError::NotAcknowledged(format!(
                        "unexpected {other:?}"
                    )))
                }
            },
            Ok(Some(Err(err))) => return Err(err),
            Ok(None) => return Err(SubscriptionError::NotAcknowledged("socket closed".into())),
            Err(_) => return Err(SubscriptionError::NotAcknowledged("timed out".into())),
        }

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(ChannelInner {
            url: url.to_string(),
            outgoing: parking_lot::Mutex::new(Some(outgoing)),
            active: DashMap::new(),
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
        });
        tokio::spawn(write_loop(outgoing_rx, sink));
        tokio::spawn(read_loop(Arc::clone(&inner), stream));
        tracing::debug!(url, "subscription channel open");
        Ok(Self {
            inner,
            persisted: Arc::new(PersistedQueryMap::new()),
            strict: false,
        })
    }

    /// With persisted query map; `strict` refuses operations missing from it
    #[must_use]
    pub fn with_persisted_queries(mut self, persisted: Arc<PersistedQueryMap>, strict: bool) -> Self {
        self.persisted = persisted;
        self.strict = strict;
        self
    }

    /// Endpoint URL
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Whether the socket is gone
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Number of live subscriptions
    #[inline]
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.active.len()
    }

    /// Start `descriptor` on the shared socket
    ///
    /// # Errors
    /// - `SubscriptionError::Closed` if the socket is gone
    /// - `SubscriptionError::UnknownOperation` in strict mode for operations
    ///   missing from the persisted map
    pub fn subscribe(
        &self,
        descriptor: &OperationDescriptor,
        variables: Value,
    ) -> Result<SubscriptionStream, SubscriptionError> {
        if self.is_closed() {
            return Err(SubscriptionError::Closed);
        }
        let request = self
            .persisted
            .request(descriptor, variables, self.strict)
            .map_err(|_| SubscriptionError::UnknownOperation(descriptor.name.to_string()))?;
        let id = Ulid::new().to_string();
        let (sender, receiver) = mpsc::unbounded_channel();
        self.inner.active.insert(
            id.clone(),
            ActiveSubscription {
                operation: descriptor.name.to_string(),
                sender,
            },
        );
        if let Err(err) = self.inner.send(WsMessage::Subscribe {
            id: id.clone(),
            payload: request.to_body(),
        }) {
            self.inner.active.remove(&id);
            return Err(err);
        }
        tracing::debug!(operation = descriptor.name, %id, "subscribed");
        Ok(SubscriptionStream {
            id,
            operation: descriptor.name,
            receiver,
            inner: Arc::clone(&self.inner),
        })
    }

    /// Close the socket; live streams end with `SubscriptionError::Closed`
    pub fn close(&self) {
        self.inner.shutdown.notify_one();
        self.inner.close();
    }
}

impl std::fmt::Debug for SubscriptionChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionChannel")
            .field("url", &self.inner.url)
            .field("active", &self.inner.active.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn write_loop(mut outgoing: mpsc::UnboundedReceiver<WsMessage>, mut sink: FrameSink) {
    while let Some(message) = outgoing.recv().await {
        let frame = match message.encode() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "dropping unencodable frame");
                continue;
            }
        };
        if let Err(err) = sink.send(frame).await {
            tracing::warn!(error = %err, "subscription socket write failed");
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(inner: Arc<ChannelInner>, mut stream: FrameStream) {
    loop {
        let frame = tokio::select! {
            () = inner.shutdown.notified() => break,
            frame = stream.next() => frame,
        };
        let text = match frame {
            Some(Ok(text)) => text,
            Some(Err(err)) => {
                tracing::warn!(url = %inner.url, error = %err, "subscription socket failed");
                break;
            }
            None => break,
        };
        let message = match WsMessage::decode(&text) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(error = %err, "ignoring malformed frame");
                continue;
            }
        };
        match message {
            WsMessage::Next { id, payload } => inner.deliver(&id, Ok(payload)),
            WsMessage::Error { id, payload } => {
                let operation = inner
                    .active
                    .get(&id)
                    .map(|entry| entry.operation.clone())
                    .unwrap_or_default();
                let message = payload
                    .iter()
                    .map(|err| err.message.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                inner.finish(&id, Some(Err(SubscriptionError::Server { operation, message })));
            }
            WsMessage::Complete { id } => inner.finish(&id, None),
            WsMessage::Ping { payload } => {
                let _ = inner.send(WsMessage::Pong { payload });
            }
            other => tracing::trace!(?other, "ignoring frame"),
        }
    }
    inner.close();
}

/// Events of one subscription
///
/// Ends when the server completes the subscription or the socket closes.
/// Dropping it unsubscribes.
pub struct SubscriptionStream {
    id: String,
    operation: &'static str,
    receiver: mpsc::UnboundedReceiver<Result<GraphQlResponse, SubscriptionError>>,
    inner: Arc<ChannelInner>,
}

impl SubscriptionStream {
    /// Subscription id on the socket
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Operation name
    #[inline]
    #[must_use]
    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

impl Stream for SubscriptionStream {
    type Item = Result<GraphQlResponse, SubscriptionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for SubscriptionStream {
    fn drop(&mut self) {
        if self.inner.active.remove(&self.id).is_some() {
            let _ = self.inner.send(WsMessage::Complete {
                id: self.id.clone(),
            });
        }
    }
}

impl std::fmt::Debug for SubscriptionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionStream")
            .field("id", &self.id)
            .field("operation", &self.operation)
            .finish_non_exhaustive()
    }
}

/// One channel per endpoint URL
pub struct SubscriptionPool {
    connector: Arc<dyn Connector>,
    channels: DashMap<String, SubscriptionChannel>,
    connecting: tokio::sync::Mutex<()>,
    init_payload: Option<Value>,
    persisted: Arc<PersistedQueryMap>,
    strict: bool,
}

impl SubscriptionPool {
    /// Create pool
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            channels: DashMap::new(),
            connecting: tokio::sync::Mutex::new(()),
            init_payload: None,
            persisted: Arc::new(PersistedQueryMap::new()),
            strict: false,
        }
    }

    /// With persisted query map handed to every channel
    #[must_use]
    pub fn with_persisted_queries(mut self, persisted: Arc<PersistedQueryMap>, strict: bool) -> Self {
        self.persisted = persisted;
        self.strict = strict;
        self
    }

    /// With `connection_init` payload
    #[must_use]
    pub fn with_init_payload(mut self, payload: Value) -> Self {
        self.init_payload = Some(payload);
        self
    }

    /// Open channel for `url`, connecting on first use or after a close
    ///
    /// # Errors
    /// Returns connection errors
    pub async fn channel(&self, url: &str) -> Result<SubscriptionChannel, SubscriptionError> {
        if let Some(channel) = self.open_channel(url) {
            return Ok(channel);
        }
        let _connecting = self.connecting.lock().await;
        if let Some(channel) = self.open_channel(url) {
            return Ok(channel);
        }
        let channel =
            SubscriptionChannel::connect(self.connector.as_ref(), url, self.init_payload.clone())
                .await?
                .with_persisted_queries(Arc::clone(&self.persisted), self.strict);
        self.channels.insert(url.to_string(), channel.clone());
        Ok(channel)
    }

    fn open_channel(&self, url: &str) -> Option<SubscriptionChannel> {
        self.channels
            .get(url)
            .filter(|channel| !channel.is_closed())
            .map(|channel| channel.clone())
    }

    /// Close every channel
    pub fn close_all(&self) {
        for channel in self.channels.iter() {
            channel.close();
        }
        self.channels.clear();
    }
}

impl std::fmt::Debug for SubscriptionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionPool")
            .field("channels", &self.channels.len())
            .finish_non_exhaustive()
    }
}

/// How events of one operation reach the store
#[derive(Clone)]
pub struct SubscriptionHandler {
    descriptor: OperationDescriptor,
    options: NormalizeOptions,
    updater: Option<Updater>,
}

impl SubscriptionHandler {
    /// Publish-only handler
    #[must_use]
    pub fn new(descriptor: OperationDescriptor) -> Self {
        Self {
            descriptor,
            options: NormalizeOptions::default(),
            updater: None,
        }
    }

    /// With updater run after each event is published
    #[must_use]
    pub fn with_updater(mut self, updater: Updater) -> Self {
        self.updater = Some(updater);
        self
    }

    /// With normalization options
    #[must_use]
    pub fn with_options(mut self, options: NormalizeOptions) -> Self {
        self.options = options;
        self
    }

    /// Operation
    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    /// Publish one event into `store`
    pub fn apply(&self, store: &Store, response: GraphQlResponse) {
        let data = match response.into_data(self.descriptor.name) {
            Ok(data) => data,
            Err(err) => {
                tracing::warn!(operation = self.descriptor.name, error = %err, "subscription event without data");
                return;
            }
        };
        if let Err(err) =
            store.publish_payload(&data, &DataId::root(), &self.options, self.updater.as_ref())
        {
            tracing::warn!(operation = self.descriptor.name, error = %err, "subscription event not stored");
        }
    }
}

/// Named subscriptions and their store handlers
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    handlers: HashMap<&'static str, SubscriptionHandler>,
}

impl SubscriptionRegistry {
    /// Create empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With handler, keyed by its operation name
    #[must_use]
    pub fn with_handler(mut self, handler: SubscriptionHandler) -> Self {
        self.handlers.insert(handler.descriptor.name, handler);
        self
    }

    /// Handler for `operation`
    #[inline]
    #[must_use]
    pub fn handler(&self, operation: &str) -> Option<&SubscriptionHandler> {
        self.handlers.get(operation)
    }

    /// Registered operation names
    pub fn operations(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.handlers.keys().copied()
    }

    /// Subscribe every registered operation and forward events to `store`
    ///
    /// # Errors
    /// Returns `SubscriptionError::Closed` if the channel is gone
    pub fn start(
        &self,
        channel: &SubscriptionChannel,
        store: &Arc<Store>,
        variables: &Value,
    ) -> Result<Vec<JoinHandle<()>>, SubscriptionError> {
        let mut tasks = Vec::with_capacity(self.handlers.len());
        for handler in self.handlers.values() {
            let stream = channel.subscribe(&handler.descriptor, variables.clone())?;
            tasks.push(forward(stream, Arc::clone(store), handler.clone()));
        }
        Ok(tasks)
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("operations", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Drive `stream` into `store` until it ends
pub fn forward(
    mut stream: SubscriptionStream,
    store: Arc<Store>,
    handler: SubscriptionHandler,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            match event {
                Ok(response) => handler.apply(&store, response),
                Err(err) => {
                    tracing::warn!(operation = stream.operation(), error = %err, "subscription ended");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_use_transport_ws_names() {
        let frame = WsMessage::Complete { id: "1".into() }.encode().unwrap();
        assert_eq!(frame, r#"{"type":"complete","id":"1"}"#);
        let init = WsMessage::decode(r#"{"type":"connection_init"}"#).unwrap();
        assert_eq!(init, WsMessage::ConnectionInit { payload: None });
        assert!(WsMessage::decode(r#"{"type":"bogus"}"#).is_err());
    }

    #[test]
    fn next_frames_carry_a_response() {
        let frame = r#"{"type":"next","id":"7","payload":{"data":{"newNotification":null}}}"#;
        let WsMessage::Next { id, payload } = WsMessage::decode(frame).unwrap() else {
            panic!("expected next");
        };
        assert_eq!(id, "7");
        assert!(payload.errors.is_empty());
    }
}
