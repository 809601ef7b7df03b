use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use vitrine_client::mutations::unseen_count;
use vitrine_client::{MemoryStorage, Preferences, SubscriptionPool, ViewerSession, WsMessage};
use vitrine_mutation::{GraphQlResponse, PersistedQueryMap};
use vitrine_test_utils::{
    connection, memory_channel, notification, user, MemoryConnector, TestEnvironment,
};

fn viewer_response() -> serde_json::Value {
    let mut notifications = connection(vec![notification("n1", false)], false);
    notifications["unseenCount"] = json!(1);
    json!({
        "viewer": {
            "__typename": "Viewer",
            "id": "v1",
            "user": user("me", "me"),
            "notifications": notifications
        }
    })
}

async fn signed_in(env: &TestEnvironment) -> ViewerSession {
    env.network.respond(viewer_response());
    ViewerSession::load(
        env.environment.clone(),
        Preferences::new(Arc::new(MemoryStorage::new())),
    )
    .await
    .unwrap()
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test]
async fn load_reads_viewer_ids_and_caches_the_viewer() {
    let env = TestEnvironment::new();
    let session = signed_in(&env).await;

    assert_eq!(session.viewer_id(), "v1");
    assert_eq!(session.user_id(), "me");
    assert_eq!(unseen_count(session.store(), "v1"), Some(1));
}

#[tokio::test]
async fn load_without_viewer_fails() {
    let env = TestEnvironment::new();
    env.network.respond(json!({"viewer": null}));

    let result = ViewerSession::load(
        env.environment.clone(),
        Preferences::new(Arc::new(MemoryStorage::new())),
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn pushed_notification_lands_in_the_viewer_list() {
    let env = TestEnvironment::new();
    let session = signed_in(&env).await;

    let (channel, mut server) = memory_channel("ws://test").await;

    let tasks = session.start_notifications(&channel).unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(channel.active_count(), 2);

    let mut new_notification_id = None;
    for _ in 0..2 {
        if let Some(WsMessage::Subscribe { id, payload }) = server.recv().await {
            if payload["operationName"] == "NewNotificationSubscription" {
                new_notification_id = Some(id);
            }
        }
    }
    let id = new_notification_id.unwrap();

    server
        .send(&WsMessage::Next {
            id,
            payload: GraphQlResponse::from_data(json!({
                "newNotification": {
                    "__typename": "SomeoneFollowedYouNotification",
                    "id": "n9",
                    "seen": false
                }
            })),
        })
        .unwrap();

    let store = Arc::clone(session.store());
    assert!(eventually(|| unseen_count(&store, "v1") == Some(2)).await);

    channel.close();
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn notifications_connect_through_the_pool() {
    let env = TestEnvironment::new();
    let session = signed_in(&env).await;

    let connector = Arc::new(MemoryConnector::new());
    let mut server = connector.add_socket();
    let persisted = PersistedQueryMap::new()
        .with_entry("NewNotificationSubscription", "sub-new")
        .with_entry("NotificationUpdatedSubscription", "sub-updated");
    let pool = SubscriptionPool::new(connector.clone())
        .with_persisted_queries(Arc::new(persisted), true);

    let (tasks, accepted) = tokio::join!(
        session.connect_notifications(&pool, "ws://test"),
        server.accept()
    );
    accepted.unwrap();
    let tasks = tasks.unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(connector.connects(), 1);

    let mut hashes = Vec::new();
    for _ in 0..2 {
        if let Some(WsMessage::Subscribe { payload, .. }) = server.recv().await {
            hashes.push(payload["extensions"]["persistedQuery"]["sha256Hash"].clone());
        }
    }
    hashes.sort_by_key(ToString::to_string);
    assert_eq!(hashes, vec![json!("sub-new"), json!("sub-updated")]);

    pool.close_all();
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn logout_empties_the_store_and_user_flags() {
    let env = TestEnvironment::new();
    let session = signed_in(&env).await;
    let preferences = session.preferences().clone();
    preferences.dismiss_banner("welcome").await.unwrap();
    preferences.set_onboarding_progress(3, false).await.unwrap();

    let store = Arc::clone(session.store());
    session.logout().await;

    assert_eq!(store.snapshot().len(), 0);
    assert!(!preferences.is_banner_dismissed("welcome").await);
    assert_eq!(preferences.onboarding_progress().await.step, 0);
}
