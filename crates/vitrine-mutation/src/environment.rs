//! Awaitable mutation invoker
//!
//! [`Environment::commit_mutation`] turns the callback network into one
//! awaitable call:
//! - the optimistic layer is applied synchronously before the request fires
//! - exactly one request is sent
//! - the call settles exactly once, within the request timeout
//! - success commits the server payload, failure rolls the layer back
//!
//! Settlement happens in a spawned task, so a caller that stops awaiting
//! (screen unmounted) does not cancel the request and does not leave a
//! pending layer in the store.

use crate::error::{MutationError, MutationResult};
use crate::network::{Completion, Network, Observer};
use crate::operation::{OperationDescriptor, PersistedQueryMap};
use crate::routing::{ErrorContext, ErrorRouter, Rejection};
use crate::state::MutationTracker;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use vitrine_store::{
    DataId, MutationId, NormalizeOptions, OptimisticPayload, PendingUpdate, Store, Updater,
};

/// Default request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Invoker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Bound on waiting for a response
    pub request_timeout: Duration,
    /// Reject operations missing from the persisted map
    pub strict_persisted: bool,
}

impl EnvironmentConfig {
    /// Create default config
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With request timeout
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// With strict persisted mode
    #[inline]
    #[must_use]
    pub fn with_strict_persisted(mut self, strict: bool) -> Self {
        self.strict_persisted = strict;
        self
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            strict_persisted: false,
        }
    }
}

/// Everything one mutation invocation needs
#[derive(Clone)]
pub struct MutationConfig {
    descriptor: OperationDescriptor,
    variables: Value,
    optimistic_response: Option<Value>,
    optimistic_updater: Option<Updater>,
    updater: Option<Updater>,
    options: NormalizeOptions,
    context: ErrorContext,
    tracker: Option<MutationTracker>,
}

impl MutationConfig {
    /// Create config for `descriptor` with `variables`
    #[must_use]
    pub fn new(descriptor: OperationDescriptor, variables: Value) -> Self {
        Self {
            descriptor,
            variables,
            optimistic_response: None,
            optimistic_updater: None,
            updater: None,
            options: NormalizeOptions::default(),
            context: ErrorContext::new(descriptor.name),
            tracker: None,
        }
    }

    /// With optimistic response (see [`OptimisticResponse`](crate::OptimisticResponse))
    #[must_use]
    pub fn with_optimistic_response(mut self, response: impl Into<Value>) -> Self {
        self.optimistic_response = Some(response.into());
        self
    }

    /// With updater run on the optimistic layer
    #[must_use]
    pub fn with_optimistic_updater(mut self, updater: Updater) -> Self {
        self.optimistic_updater = Some(updater);
        self
    }

    /// With updater run on the confirmed layer after success
    #[must_use]
    pub fn with_updater(mut self, updater: Updater) -> Self {
        self.updater = Some(updater);
        self
    }

    /// With normalization options for both payloads
    #[must_use]
    pub fn with_normalize_options(mut self, options: NormalizeOptions) -> Self {
        self.options = options;
        self
    }

    /// With error context
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = context;
        self
    }

    /// With tracker driven through the invocation
    #[must_use]
    pub fn with_tracker(mut self, tracker: MutationTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Operation
    #[inline]
    #[must_use]
    pub fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    /// Whether an optimistic layer will be applied
    #[inline]
    #[must_use]
    pub fn is_optimistic(&self) -> bool {
        self.optimistic_response.is_some() || self.optimistic_updater.is_some()
    }
}

impl fmt::Debug for MutationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationConfig")
            .field("operation", &self.descriptor.name)
            .field("variables", &self.variables)
            .field("optimistic_response", &self.optimistic_response)
            .field("has_optimistic_updater", &self.optimistic_updater.is_some())
            .field("has_updater", &self.updater.is_some())
            .finish_non_exhaustive()
    }
}

/// What the settle task needs after the request fired
struct Settlement {
    id: MutationId,
    operation: &'static str,
    completion: Completion,
    updater: Option<Updater>,
    options: NormalizeOptions,
    context: ErrorContext,
    tracker: Option<MutationTracker>,
}

/// Store, network and routing bundled for call sites
#[derive(Clone)]
pub struct Environment {
    store: Arc<Store>,
    network: Arc<dyn Network>,
    persisted: Arc<PersistedQueryMap>,
    router: ErrorRouter,
    config: EnvironmentConfig,
}

impl Environment {
    /// Create environment with default routing and no persisted queries
    #[must_use]
    pub fn new(store: Arc<Store>, network: Arc<dyn Network>) -> Self {
        Self {
            store,
            network,
            persisted: Arc::new(PersistedQueryMap::new()),
            router: ErrorRouter::default(),
            config: EnvironmentConfig::default(),
        }
    }

    /// With persisted query map
    #[must_use]
    pub fn with_persisted_queries(mut self, persisted: PersistedQueryMap) -> Self {
        self.persisted = Arc::new(persisted);
        self
    }

    /// With error router
    #[must_use]
    pub fn with_router(mut self, router: ErrorRouter) -> Self {
        self.router = router;
        self
    }

    /// With config
    #[must_use]
    pub fn with_config(mut self, config: EnvironmentConfig) -> Self {
        self.config = config;
        self
    }

    /// Store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Error router
    #[inline]
    #[must_use]
    pub fn router(&self) -> &ErrorRouter {
        &self.router
    }

    /// Persisted query map
    #[inline]
    #[must_use]
    pub fn persisted_queries(&self) -> &Arc<PersistedQueryMap> {
        &self.persisted
    }

    /// Config
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    /// Run a mutation to settlement
    ///
    /// # Errors
    /// Returns the surfaced error; it has already been routed and the
    /// optimistic layer (if any) rolled back
    pub async fn commit_mutation(&self, config: MutationConfig) -> MutationResult<Value> {
        let MutationConfig {
            descriptor,
            variables,
            optimistic_response,
            optimistic_updater,
            updater,
            options,
            context,
            tracker,
        } = config;

        let request = match self
            .persisted
            .request(&descriptor, variables, self.config.strict_persisted)
        {
            Ok(request) => request,
            Err(err) => return Err(self.reject(err, &context)),
        };
        if let Some(tracker) = &tracker {
            if let Err(err) = tracker.begin() {
                return Err(self.reject(err.into(), &context));
            }
        }

        let id = MutationId::new();
        let mut pending = PendingUpdate::new(id);
        if let Some(data) = optimistic_response {
            pending = pending.with_response(OptimisticPayload::new(data).with_options(options.clone()));
        }
        if let Some(updater) = optimistic_updater {
            pending = pending.with_updater(updater);
        }
        if !pending.is_empty() {
            if let Err(err) = self.store.apply_optimistic(pending) {
                mark_failed(tracker.as_ref());
                return Err(self.reject(err.into(), &context));
            }
        }

        let (observer, completion) = Observer::channel();
        tracing::debug!(operation = descriptor.name, mutation = %id, "mutation sent");
        self.network.execute(request, observer);

        let settlement = Settlement {
            id,
            operation: descriptor.name,
            completion,
            updater,
            options,
            context,
            tracker,
        };
        let environment = self.clone();
        tokio::spawn(async move { environment.settle(settlement).await })
            .await
            .map_err(|_| MutationError::Abandoned {
                operation: descriptor.name.to_string(),
            })?
    }

    async fn settle(self, settlement: Settlement) -> MutationResult<Value> {
        let Settlement {
            id,
            operation,
            completion,
            updater,
            options,
            context,
            tracker,
        } = settlement;

        let outcome = self
            .await_data(operation, completion)
            .await
            .and_then(|data| {
                self.store
                    .commit(id, &data, &DataId::root(), &options, updater.as_ref())
                    .map(|()| data)
                    .map_err(MutationError::from)
            });

        match outcome {
            Ok(data) => {
                if let Some(tracker) = &tracker {
                    if let Err(err) = tracker.succeed() {
                        tracing::warn!(operation, error = %err, "tracker out of step");
                    }
                }
                tracing::debug!(operation, mutation = %id, "mutation committed");
                Ok(data)
            }
            Err(err) => {
                self.store.rollback(id);
                mark_failed(tracker.as_ref());
                tracing::debug!(operation, mutation = %id, error = %err, "mutation rolled back");
                Err(self.reject(err, &context))
            }
        }
    }

    /// Fetch a query and publish the response
    ///
    /// # Errors
    /// Returns network, GraphQL or normalization errors; nothing is routed
    pub async fn execute_query(
        &self,
        descriptor: &OperationDescriptor,
        variables: Value,
        root: &DataId,
        options: &NormalizeOptions,
    ) -> MutationResult<Value> {
        let request = self
            .persisted
            .request(descriptor, variables, self.config.strict_persisted)?;
        let (observer, completion) = Observer::channel();
        self.network.execute(request, observer);

        let data = self.await_data(descriptor.name, completion).await?;
        self.store.publish_response(&data, root, options)?;
        Ok(data)
    }

    async fn await_data(&self, operation: &str, completion: Completion) -> MutationResult<Value> {
        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, completion.wait(operation)).await {
            Ok(response) => response?.into_data(operation),
            Err(_) => Err(MutationError::Timeout {
                operation: operation.to_string(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    fn reject(&self, error: MutationError, context: &ErrorContext) -> MutationError {
        self.router.route(&Rejection::classify(&error), context);
        error
    }
}

fn mark_failed(tracker: Option<&MutationTracker>) {
    if let Some(tracker) = tracker {
        if let Err(err) = tracker.fail() {
            tracing::warn!(error = %err, "tracker out of step");
        }
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("store", &self.store)
            .field("persisted", &self.persisted.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{GraphQlRequest, GraphQlResponse};
    use crate::NetworkError;
    use parking_lot::Mutex;
    use serde_json::json;

    const RENAME: OperationDescriptor = OperationDescriptor::mutation(
        "RenameUserMutation",
        "mutation RenameUserMutation($name: String!) { updateUser(name: $name) { __typename } }",
    );

    /// Network that keeps observers until the test settles them
    #[derive(Default)]
    struct Held {
        observers: Mutex<Vec<(GraphQlRequest, Observer)>>,
    }

    impl Network for Held {
        fn execute(&self, request: GraphQlRequest, observer: Observer) {
            self.observers.lock().push((request, observer));
        }
    }

    impl Held {
        fn take(&self) -> Observer {
            self.observers.lock().remove(0).1
        }
    }

    fn setup() -> (Environment, Arc<Held>) {
        let store = Arc::new(Store::new());
        store
            .publish_response(
                &json!({"viewer": {"__typename": "GalleryUser", "id": "u1", "username": "ada"}}),
                &DataId::root(),
                &NormalizeOptions::new(),
            )
            .unwrap();
        let network = Arc::new(Held::default());
        let environment = Environment::new(store, network.clone());
        (environment, network)
    }

    fn username(environment: &Environment) -> Value {
        environment
            .store()
            .lookup(&DataId::entity("GalleryUser", "u1"))
            .and_then(|record| record.get_scalar("username").cloned())
            .unwrap_or(Value::Null)
    }

    fn rename(name: &str) -> MutationConfig {
        MutationConfig::new(RENAME, json!({"name": name})).with_optimistic_response(json!({
            "updateUser": {"__typename": "GalleryUser", "id": "u1", "username": name}
        }))
    }

    #[tokio::test]
    async fn optimistic_layer_is_visible_before_settlement() {
        let (environment, network) = setup();
        let task = {
            let environment = environment.clone();
            tokio::spawn(async move { environment.commit_mutation(rename("optimistic")).await })
        };
        tokio::task::yield_now().await;
        while network.observers.lock().is_empty() {
            tokio::task::yield_now().await;
        }

        assert_eq!(username(&environment), json!("optimistic"));
        assert_eq!(environment.store().pending_count(), 1);

        network.take().complete(GraphQlResponse::from_data(json!({
            "updateUser": {"__typename": "GalleryUser", "id": "u1", "username": "server"}
        })));
        let data = task.await.unwrap().unwrap();
        assert_eq!(data["updateUser"]["username"], "server");
        assert_eq!(username(&environment), json!("server"));
        assert_eq!(environment.store().pending_count(), 0);
    }

    #[tokio::test]
    async fn failure_restores_snapshot() {
        let (environment, network) = setup();
        let before = environment.store().snapshot();
        let task = {
            let environment = environment.clone();
            tokio::spawn(async move { environment.commit_mutation(rename("optimistic")).await })
        };
        while network.observers.lock().is_empty() {
            tokio::task::yield_now().await;
        }
        network.take().error(NetworkError::Transport("reset".into()));

        let err = task.await.unwrap().unwrap_err();
        assert!(err.is_network());
        assert_eq!(environment.store().snapshot(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_rolls_back() {
        let (environment, network) = setup();
        let environment = environment.with_config(
            EnvironmentConfig::new().with_request_timeout(Duration::from_millis(50)),
        );
        let before = environment.store().snapshot();

        let err = environment
            .commit_mutation(rename("optimistic"))
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::Timeout { timeout_ms: 50, .. }));
        assert_eq!(environment.store().snapshot(), before);
        // late completion goes nowhere
        network.take().complete(GraphQlResponse::from_data(json!({})));
    }

    #[tokio::test]
    async fn tracker_follows_invocation() {
        let (environment, network) = setup();
        let tracker = MutationTracker::new();
        let task = {
            let environment = environment.clone();
            let config = rename("x").with_tracker(tracker.clone());
            tokio::spawn(async move { environment.commit_mutation(config).await })
        };
        while network.observers.lock().is_empty() {
            tokio::task::yield_now().await;
        }
        assert_eq!(tracker.state(), crate::MutationState::Pending);
        drop(network.take());

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, MutationError::Abandoned { .. }));
        assert_eq!(tracker.state(), crate::MutationState::Failed);
    }

    #[tokio::test]
    async fn strict_mode_rejects_before_any_side_effect() {
        let (environment, network) = setup();
        let environment =
            environment.with_config(EnvironmentConfig::new().with_strict_persisted(true));
        let before = environment.store().snapshot();

        let err = environment
            .commit_mutation(rename("optimistic"))
            .await
            .unwrap_err();
        assert!(matches!(err, MutationError::UnknownOperation(_)));
        assert!(network.observers.lock().is_empty());
        assert_eq!(environment.store().snapshot(), before);
    }
}
