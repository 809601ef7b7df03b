//! Viewer session
//!
//! Everything a call site needs about the signed-in viewer, passed
//! explicitly: ids, the environment, device preferences and the token sync
//! lock. Building one from [`ClientConfig`] wires the HTTP network, the
//! persisted query map and file-backed preferences. Live subscriptions go
//! over a [`WsConnector`] pool pointed at the configured subscription URL.

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::http::HttpNetwork;
use crate::mutations::{self, operations::VIEWER_QUERY, Chain};
use crate::storage::{FileStorage, Preferences};
use crate::subscription::{SubscriptionChannel, SubscriptionPool, SubscriptionRegistry};
use crate::ws::WsConnector;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use vitrine_mutation::{
    Environment, ErrorRouter, MutationError, MutationTracker, PersistedQueryMap, SyncTokensLock,
};
use vitrine_store::{DataId, NormalizeOptions, Store};

/// Environment for `config`: fresh store, HTTP network, persisted map
///
/// # Errors
/// Returns error if the HTTP client cannot be built or the persisted query
/// map cannot be loaded
pub fn environment_from_config(config: &ClientConfig) -> ClientResult<Environment> {
    let network = HttpNetwork::from_config(config).map_err(MutationError::from)?;
    let mut environment = Environment::new(Arc::new(Store::new()), Arc::new(network))
        .with_router(ErrorRouter::default().with_toast_duration(config.toast_duration()))
        .with_config(config.environment_config());
    if let Some(path) = &config.persisted_queries {
        environment = environment.with_persisted_queries(PersistedQueryMap::load(path)?);
    }
    Ok(environment)
}

/// WebSocket subscription pool sharing the environment's persisted map
#[must_use]
pub fn subscriptions_from_config(config: &ClientConfig, environment: &Environment) -> SubscriptionPool {
    tracing::debug!(url = config.subscription_url(), "subscription pool ready");
    SubscriptionPool::new(Arc::new(WsConnector::new())).with_persisted_queries(
        Arc::clone(environment.persisted_queries()),
        environment.config().strict_persisted,
    )
}

/// File-backed preferences in the configured storage directory
#[must_use]
pub fn preferences_from_config(config: &ClientConfig) -> Preferences {
    Preferences::new(Arc::new(FileStorage::in_dir(&config.storage_dir)))
}

/// Signed-in viewer context
#[derive(Debug, Clone)]
pub struct ViewerSession {
    viewer_id: String,
    user_id: String,
    environment: Environment,
    preferences: Preferences,
    sync_lock: SyncTokensLock,
}

impl ViewerSession {
    /// Session for known ids
    #[must_use]
    pub fn new(
        viewer_id: impl Into<String>,
        user_id: impl Into<String>,
        environment: Environment,
        preferences: Preferences,
    ) -> Self {
        Self {
            viewer_id: viewer_id.into(),
            user_id: user_id.into(),
            environment,
            preferences,
            sync_lock: SyncTokensLock::new(),
        }
    }

    /// Fetch the viewer and start a session for it
    ///
    /// # Errors
    /// Returns the query failure, or `MutationError::Payload` when nobody is
    /// signed in
    pub async fn load(environment: Environment, preferences: Preferences) -> ClientResult<Self> {
        let data = environment
            .execute_query(
                &VIEWER_QUERY,
                json!({}),
                &DataId::root(),
                &NormalizeOptions::new(),
            )
            .await?;
        let viewer_id = string_at(&data, "/viewer/id")?;
        let user_id = string_at(&data, "/viewer/user/id")?;
        tracing::debug!(%viewer_id, %user_id, "viewer session started");
        Ok(Self::new(viewer_id, user_id, environment, preferences))
    }

    /// Viewer id
    #[inline]
    #[must_use]
    pub fn viewer_id(&self) -> &str {
        &self.viewer_id
    }

    /// Viewer's user id
    #[inline]
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Environment
    #[inline]
    #[must_use]
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        self.environment.store()
    }

    /// Device preferences
    #[inline]
    #[must_use]
    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    /// Token sync lock shared by every clone of this session
    #[inline]
    #[must_use]
    pub fn sync_lock(&self) -> &SyncTokensLock {
        &self.sync_lock
    }

    /// Follow `user_id`
    ///
    /// # Errors
    /// See [`mutations::follow_user`]
    pub async fn follow(&self, user_id: &str, follower_ids: &[String]) -> ClientResult<()> {
        mutations::follow_user(&self.environment, user_id, &self.user_id, follower_ids).await
    }

    /// Unfollow `user_id`
    ///
    /// # Errors
    /// See [`mutations::unfollow_user`]
    pub async fn unfollow(&self, user_id: &str, follower_ids: &[String]) -> ClientResult<()> {
        mutations::unfollow_user(&self.environment, user_id, &self.user_id, follower_ids).await
    }

    /// Mark the viewer's notifications seen
    ///
    /// # Errors
    /// See [`mutations::clear_notifications`]
    pub async fn clear_notifications(&self, notification_ids: &[String]) -> ClientResult<()> {
        mutations::clear_notifications(&self.environment, &self.viewer_id, notification_ids).await
    }

    /// Remove wallets from the viewer's account
    ///
    /// # Errors
    /// See [`mutations::remove_wallet`]
    pub async fn remove_wallet(&self, wallet_ids: &[String]) -> ClientResult<()> {
        mutations::remove_wallet(&self.environment, wallet_ids, &self.user_id).await
    }

    /// Sync the viewer's tokens under the session lock
    ///
    /// # Errors
    /// See [`mutations::sync_tokens`]
    pub async fn sync_tokens(
        &self,
        chains: &[Chain],
        tracker: Option<MutationTracker>,
    ) -> ClientResult<()> {
        mutations::sync_tokens(&self.environment, &self.sync_lock, chains, tracker).await
    }

    /// Live notification handlers for this viewer
    #[must_use]
    pub fn notification_subscriptions(&self) -> SubscriptionRegistry {
        mutations::notification_subscriptions(&self.viewer_id)
    }

    /// Subscribe this viewer's notifications on `channel`
    ///
    /// # Errors
    /// Returns `SubscriptionError::Closed` if the channel is gone
    pub fn start_notifications(
        &self,
        channel: &SubscriptionChannel,
    ) -> ClientResult<Vec<JoinHandle<()>>> {
        Ok(self
            .notification_subscriptions()
            .start(channel, self.store(), &json!({}))?)
    }

    /// Connect `pool` to `url` and subscribe this viewer's notifications
    ///
    /// # Errors
    /// Returns the connect failure, or the subscribe failure of
    /// [`ViewerSession::start_notifications`]
    pub async fn connect_notifications(
        &self,
        pool: &SubscriptionPool,
        url: &str,
    ) -> ClientResult<Vec<JoinHandle<()>>> {
        let channel = pool.channel(url).await?;
        self.start_notifications(&channel)
    }

    /// End the session: empty the store and drop per-user device flags
    pub async fn logout(self) {
        self.environment.store().reset();
        if let Err(err) = self.preferences.clear_user_flags().await {
            tracing::warn!(error = %err, "preference cleanup did not finish");
        }
        tracing::debug!(viewer_id = %self.viewer_id, "viewer session ended");
    }
}

fn string_at(data: &Value, pointer: &str) -> Result<String, MutationError> {
    data.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| MutationError::Payload {
            field: pointer.trim_start_matches('/').replace('/', "."),
            reason: "not signed in".to_string(),
        })
}
