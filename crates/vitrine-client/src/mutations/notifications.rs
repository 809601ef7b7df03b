//! Notification hooks and live notification handlers
//!
//! The viewer's notifications are fetched under more than one filter, and
//! each filter is its own connection key. Clearing has to zero
//! `unseenCount` on every one of them.

use super::operations::{CLEAR_NOTIFICATIONS, NEW_NOTIFICATION, NOTIFICATION_UPDATED};
use super::{surface, viewer_record};
use crate::error::ClientResult;
use crate::subscription::{SubscriptionHandler, SubscriptionRegistry};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use vitrine_mutation::{
    decode_payload, on_success, DomainError, Environment, ErrorContext, ErrorMessage,
    MutationConfig, PayloadVariant,
};
use vitrine_store::{Arguments, ConnectionHandler, ConnectionKey, DataId, Store, Updater};

const NOTIFICATIONS: &str = "notifications";
const UNSEEN_COUNT: &str = "unseenCount";
const CLEARED_FIELD: &str = "clearAllNotifications";

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum ClearResult {
    ClearAllNotificationsPayload {},
    ErrNotAuthorized(ErrorMessage),
}

impl PayloadVariant for ClearResult {
    type Ok = ();

    fn into_result(self) -> Result<(), DomainError> {
        match self {
            Self::ClearAllNotificationsPayload {} => Ok(()),
            Self::ErrNotAuthorized(err) => Err(DomainError::NotAuthorized(err.message)),
        }
    }
}

/// Every connection key the viewer's notifications are stored under
#[must_use]
pub fn notification_connection_keys(viewer_id: &str) -> Vec<ConnectionKey> {
    let viewer = viewer_record(viewer_id);
    let mut unseen_only = Arguments::new();
    unseen_only.insert("unseenOnly".to_string(), Value::Bool(true));
    vec![
        ConnectionKey::new(viewer.clone(), NOTIFICATIONS),
        ConnectionKey::with_args(viewer, NOTIFICATIONS, &unseen_only),
    ]
}

/// `unseenCount` of the unfiltered notification connection
#[must_use]
pub fn unseen_count(store: &Store, viewer_id: &str) -> Option<i64> {
    let key = ConnectionKey::new(viewer_record(viewer_id), NOTIFICATIONS);
    store
        .connection(&key)
        .and_then(|connection| connection.scalar(UNSEEN_COUNT).and_then(Value::as_i64))
}

fn clear_updater(viewer_id: String, notification_ids: Vec<String>) -> Updater {
    Arc::new(move |proxy, _data| {
        for key in notification_connection_keys(&viewer_id) {
            let nodes: Vec<DataId> = ConnectionHandler::get(proxy, &key)
                .map(|connection| connection.node_ids().cloned().collect())
                .unwrap_or_default();
            ConnectionHandler::set_field(proxy, &key, UNSEEN_COUNT, json!(0));
            for node in nodes {
                let listed = notification_ids.is_empty()
                    || node
                        .entity_id()
                        .is_some_and(|id| notification_ids.iter().any(|listed| listed == id));
                if listed {
                    proxy.set_value(&node, "seen", Value::Bool(true));
                }
            }
        }
    })
}

/// Mark the viewer's notifications seen
///
/// `unseenCount` drops to zero on every notification connection at once
/// and stays there once the server confirms. An empty `notification_ids`
/// marks every loaded notification.
///
/// # Errors
/// Returns the rejection or the typed error variant
pub async fn clear_notifications(
    environment: &Environment,
    viewer_id: &str,
    notification_ids: &[String],
) -> ClientResult<()> {
    let updater = clear_updater(viewer_id.to_string(), notification_ids.to_vec());
    let context = ErrorContext::new(CLEAR_NOTIFICATIONS.name).with_tag("viewerId", viewer_id);
    let config = MutationConfig::new(CLEAR_NOTIFICATIONS, json!({}))
        .with_optimistic_updater(Arc::clone(&updater))
        .with_updater(on_success::<ClearResult>(CLEARED_FIELD, updater))
        .with_context(context.clone());
    let data = environment.commit_mutation(config).await?;
    decode_payload::<ClearResult>(&data, CLEARED_FIELD)
        .map_err(|err| surface(environment, &context, err))
}

fn new_notification_updater(viewer_id: String) -> Updater {
    Arc::new(move |proxy, data| {
        let Some(node) = data.get("newNotification") else {
            return;
        };
        let (Some(typename), Some(id)) = (
            node.get("__typename").and_then(Value::as_str),
            node.get("id").and_then(Value::as_str),
        ) else {
            return;
        };
        let node_id = DataId::entity(typename, id);
        let seen = node.get("seen").and_then(Value::as_bool).unwrap_or(false);

        for (index, key) in notification_connection_keys(&viewer_id).iter().enumerate() {
            // index 0 is the unfiltered list; the rest only hold unseen items
            if seen && index > 0 {
                continue;
            }
            let mut added = false;
            ConnectionHandler::patch(proxy, key, |connection| {
                added = connection.insert_edge_front(ConnectionHandler::create_edge(node_id.clone()));
            });
            if added && !seen {
                ConnectionHandler::increment_field(proxy, key, UNSEEN_COUNT, 1);
            }
        }
    })
}

/// Live notification handlers for `viewer_id`
///
/// New notifications are prepended to the viewer's notification
/// connections and bump `unseenCount`; updates are published as is.
#[must_use]
pub fn notification_subscriptions(viewer_id: &str) -> SubscriptionRegistry {
    SubscriptionRegistry::new()
        .with_handler(
            SubscriptionHandler::new(NEW_NOTIFICATION)
                .with_updater(new_notification_updater(viewer_id.to_string())),
        )
        .with_handler(SubscriptionHandler::new(NOTIFICATION_UPDATED))
}
