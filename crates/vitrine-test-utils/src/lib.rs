//! Testing utilities for Vitrine workspace
//!
//! Scripted network, recording reporter/toast sinks, an in-process
//! subscription socket, and store fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vitrine_client::{Connector, FrameSink, FrameStream, SubscriptionError, WsMessage};
use vitrine_mutation::{
    Environment, ErrorContext, ErrorReporter, ErrorRouter, GraphQlError, GraphQlRequest,
    GraphQlResponse, Network, NetworkError, Observer, Toast, ToastSink,
};
use vitrine_store::{DataId, NormalizeOptions, Store};

/// What the mock network does with the next request
#[derive(Debug, Clone)]
pub enum Scripted {
    Respond(GraphQlResponse),
    Fail(NetworkError),
    /// Drop the observer without settling
    Drop,
    /// Keep the observer until the test settles it
    Hold,
}

/// Network answering from a script
#[derive(Debug, Default)]
pub struct MockNetwork {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<GraphQlRequest>>,
    held: Mutex<VecDeque<Observer>>,
    delay: Option<Duration>,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settle from a spawned task after `delay`
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, step: Scripted) -> &Self {
        self.script.lock().push_back(step);
        self
    }

    pub fn respond(&self, data: Value) -> &Self {
        self.push(Scripted::Respond(GraphQlResponse::from_data(data)))
    }

    pub fn respond_errors(&self, messages: &[&str]) -> &Self {
        let errors = messages.iter().map(|m| GraphQlError::new(*m)).collect();
        self.push(Scripted::Respond(GraphQlResponse::from_errors(errors)))
    }

    pub fn fail(&self, error: NetworkError) -> &Self {
        self.push(Scripted::Fail(error))
    }

    pub fn hold(&self) -> &Self {
        self.push(Scripted::Hold)
    }

    pub fn requests(&self) -> Vec<GraphQlRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }

    /// Settle the oldest held observer
    pub fn complete_held(&self, data: Value) -> bool {
        match self.held.lock().pop_front() {
            Some(observer) => {
                observer.complete(GraphQlResponse::from_data(data));
                true
            }
            None => false,
        }
    }

    /// Fail the oldest held observer
    pub fn fail_held(&self, error: NetworkError) -> bool {
        match self.held.lock().pop_front() {
            Some(observer) => {
                observer.error(error);
                true
            }
            None => false,
        }
    }

    /// Wait until `count` observers are held
    pub async fn wait_held(&self, count: usize) {
        while self.held_count() < count {
            tokio::task::yield_now().await;
        }
    }

    fn settle(step: Scripted, observer: Observer) {
        match step {
            Scripted::Respond(response) => observer.complete(response),
            Scripted::Fail(error) => observer.error(error),
            Scripted::Drop | Scripted::Hold => drop(observer),
        }
    }
}

impl Network for MockNetwork {
    fn execute(&self, request: GraphQlRequest, observer: Observer) {
        self.requests.lock().push(request);
        let step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Scripted::Fail(NetworkError::Transport("no scripted response".into())));

        match (step, self.delay) {
            (Scripted::Hold, _) => self.held.lock().push_back(observer),
            (step, Some(delay)) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    Self::settle(step, observer);
                });
            }
            (step, None) => Self::settle(step, observer),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub message: String,
    pub context: ErrorContext,
}

/// Reporter that remembers every report
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<Report>>,
}

impl RecordingReporter {
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.reports.lock().len()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, error: &(dyn Error + 'static), context: &ErrorContext) {
        self.reports.lock().push(Report {
            message: error.to_string(),
            context: context.clone(),
        });
    }
}

/// Toast sink that remembers every toast
#[derive(Debug, Default)]
pub struct RecordingToasts {
    toasts: Mutex<Vec<Toast>>,
}

impl RecordingToasts {
    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.toasts.lock().len()
    }
}

impl ToastSink for RecordingToasts {
    fn push(&self, toast: Toast) {
        self.toasts.lock().push(toast);
    }
}

/// Store, scripted network and recording sinks wired into an environment
pub struct TestEnvironment {
    pub environment: Environment,
    pub network: Arc<MockNetwork>,
    pub reporter: Arc<RecordingReporter>,
    pub toasts: Arc<RecordingToasts>,
}

impl TestEnvironment {
    pub fn new() -> Self {
        Self::with_network(MockNetwork::new())
    }

    pub fn with_network(network: MockNetwork) -> Self {
        let network = Arc::new(network);
        let reporter = Arc::new(RecordingReporter::default());
        let toasts = Arc::new(RecordingToasts::default());
        let environment = Environment::new(Arc::new(Store::new()), network.clone())
            .with_router(ErrorRouter::new(reporter.clone(), toasts.clone()));
        Self {
            environment,
            network,
            reporter,
            toasts,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        self.environment.store()
    }

    /// Publish a query response rooted at `client:root`
    pub fn seed(&self, payload: &Value) {
        self.store()
            .publish_response(payload, &DataId::root(), &NormalizeOptions::new())
            .unwrap();
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

// Subscription socket

/// In-process [`Connector`] with a scriptable server end
#[derive(Default)]
pub struct MemoryConnector {
    servers: Mutex<Vec<(FrameSink, FrameStream)>>,
    connects: AtomicUsize,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one socket; returns its server end
    pub fn add_socket(&self) -> MemoryServer {
        let (client_tx, server_rx) = unbounded::<String>();
        let (server_tx, client_rx) = unbounded::<String>();
        let sink: FrameSink = Box::pin(client_tx.sink_map_err(|_| SubscriptionError::Closed));
        let stream: FrameStream = Box::pin(client_rx.map(Ok));
        self.servers.lock().push((sink, stream));
        MemoryServer {
            incoming: server_rx,
            outgoing: server_tx,
        }
    }

    /// Number of successful connects
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), SubscriptionError> {
        let mut servers = self.servers.lock();
        if servers.is_empty() {
            return Err(SubscriptionError::Connect(format!("no socket for {url}")));
        }
        self.connects.fetch_add(1, Ordering::AcqRel);
        Ok(servers.remove(0))
    }
}

impl std::fmt::Debug for MemoryConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnector")
            .field("connects", &self.connects())
            .finish_non_exhaustive()
    }
}

/// Server end of a [`MemoryConnector`] socket
pub struct MemoryServer {
    incoming: UnboundedReceiver<String>,
    outgoing: UnboundedSender<String>,
}

impl MemoryServer {
    /// Next message from the client
    pub async fn recv(&mut self) -> Option<WsMessage> {
        let frame = self.incoming.next().await?;
        WsMessage::decode(&frame).ok()
    }

    pub fn send(&self, message: &WsMessage) -> Result<(), SubscriptionError> {
        self.outgoing
            .unbounded_send(message.encode()?)
            .map_err(|_| SubscriptionError::Closed)
    }

    /// Send a raw text frame
    pub fn send_raw(&self, frame: impl Into<String>) -> Result<(), SubscriptionError> {
        self.outgoing
            .unbounded_send(frame.into())
            .map_err(|_| SubscriptionError::Closed)
    }

    /// Answer `connection_init` with `connection_ack`
    pub async fn accept(&mut self) -> Result<(), SubscriptionError> {
        match self.recv().await {
            Some(WsMessage::ConnectionInit { .. }) => {
                self.send(&WsMessage::ConnectionAck { payload: None })
            }
            other => Err(SubscriptionError::NotAcknowledged(format!("{other:?}"))),
        }
    }

    /// Close the socket from the server side
    pub fn hang_up(self) {
        self.outgoing.close_channel();
    }
}

impl std::fmt::Debug for MemoryServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryServer").finish_non_exhaustive()
    }
}

/// Channel on `url` over a fresh [`MemoryConnector`] socket, already acknowledged
pub async fn memory_channel(url: &str) -> (vitrine_client::SubscriptionChannel, MemoryServer) {
    let connector = MemoryConnector::new();
    let mut server = connector.add_socket();
    let (channel, accepted) = tokio::join!(
        vitrine_client::SubscriptionChannel::connect(&connector, url, None),
        server.accept()
    );
    accepted.expect("client sends connection_init");
    (channel.expect("channel connects"), server)
}

// Fixtures

pub fn user(id: &str, username: &str) -> Value {
    json!({"__typename": "GalleryUser", "id": id, "username": username})
}

pub fn user_with_followers(id: &str, username: &str, followers: &[&str]) -> Value {
    let followers: Vec<Value> = followers.iter().map(|f| user(f, f)).collect();
    json!({
        "__typename": "GalleryUser",
        "id": id,
        "username": username,
        "followers": followers,
        "following": []
    })
}

pub fn notification(id: &str, seen: bool) -> Value {
    json!({"__typename": "SomeoneFollowedYouNotification", "id": id, "seen": seen})
}

/// Connection payload with cursors `c0..cn`
pub fn connection(nodes: Vec<Value>, has_next_page: bool) -> Value {
    let edges: Vec<Value> = nodes
        .into_iter()
        .enumerate()
        .map(|(index, node)| json!({"cursor": format!("c{index}"), "node": node}))
        .collect();
    let end_cursor = edges.last().map(|edge| edge["cursor"].clone());
    json!({
        "pageInfo": {"endCursor": end_cursor, "hasNextPage": has_next_page},
        "edges": edges
    })
}

/// `{ viewer { ... user { ... } } }`
pub fn viewer_payload(viewer_id: &str, user: Value) -> Value {
    json!({
        "viewer": {
            "__typename": "Viewer",
            "id": viewer_id,
            "user": user
        }
    })
}
