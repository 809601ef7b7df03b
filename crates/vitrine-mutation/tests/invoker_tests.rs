use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use vitrine_mutation::{
    entity, EnvironmentConfig, ErrorContext, MutationConfig, MutationError, MutationTracker,
    NetworkError, OperationDescriptor, OptimisticResponse, PersistedQueryMap, ToastPolicy,
};
use vitrine_store::{DataId, StoreProxy, Updater};
use vitrine_test_utils::{user_with_followers, viewer_payload, MockNetwork, Scripted, TestEnvironment};

const FOLLOW: OperationDescriptor = OperationDescriptor::mutation(
    "FollowUserMutation",
    "mutation FollowUserMutation($userId: DBID!) { followUser(userId: $userId) { __typename } }",
);

fn target() -> DataId {
    DataId::entity("GalleryUser", "u1")
}

fn seeded(network: MockNetwork) -> TestEnvironment {
    let env = TestEnvironment::with_network(network);
    env.seed(&json!({"userById": user_with_followers("u1", "ada", &[])}));
    env.seed(&viewer_payload("v1", user_with_followers("me", "me", &[])));
    env
}

fn follow_config() -> MutationConfig {
    let add_me: Updater = Arc::new(|proxy: &mut StoreProxy<'_>, _: &Value| {
        let mut followers = proxy.get_linked_records(&target(), "followers");
        followers.push(DataId::entity("GalleryUser", "me"));
        proxy.set_linked_records(&target(), "followers", followers);
    });
    MutationConfig::new(FOLLOW, json!({"userId": "u1"}))
        .with_optimistic_response(
            OptimisticResponse::payload("followUser", "FollowUserPayload")
                .entity("user", entity("GalleryUser", "u1").with("followerCount", 1)),
        )
        .with_optimistic_updater(add_me)
        .with_context(
            ErrorContext::new("follow")
                .with_tag("userId", "u1")
                .with_toast(ToastPolicy::Message("Could not follow".into())),
        )
}

fn server_follow() -> Value {
    json!({
        "followUser": {
            "__typename": "FollowUserPayload",
            "user": {
                "__typename": "GalleryUser",
                "id": "u1",
                "followerCount": 7,
                "followers": [{"__typename": "GalleryUser", "id": "me", "username": "me"}]
            }
        }
    })
}

#[tokio::test]
async fn optimistic_patch_lands_before_the_network_resolves() {
    let network = MockNetwork::new();
    network.hold();
    let env = seeded(network);

    let task = {
        let environment = env.environment.clone();
        tokio::spawn(async move { environment.commit_mutation(follow_config()).await })
    };
    env.network.wait_held(1).await;

    let user = env.store().lookup(&target()).unwrap();
    assert_eq!(user.get_links("followers").len(), 1);
    assert_eq!(user.get_scalar("followerCount"), Some(&json!(1)));

    env.network.complete_held(server_follow());
    task.await.unwrap().unwrap();

    let user = env.store().lookup(&target()).unwrap();
    assert_eq!(user.get_scalar("followerCount"), Some(&json!(7)));
    assert_eq!(env.network.request_count(), 1);
}

#[tokio::test]
async fn failure_is_reported_toasted_and_rolled_back() {
    let network = MockNetwork::new();
    network.fail(NetworkError::Status {
        status: 502,
        body: "bad gateway".into(),
    });
    let env = seeded(network);
    let before = env.store().snapshot();

    let err = env
        .environment
        .commit_mutation(follow_config())
        .await
        .unwrap_err();
    assert!(matches!(err, MutationError::Network(NetworkError::Status { status: 502, .. })));
    assert_eq!(env.store().snapshot(), before);

    let reports = env.reporter.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].context.tags["userId"], "u1");
    assert_eq!(env.toasts.toasts()[0].message, "Could not follow");
}

#[tokio::test]
async fn graphql_errors_without_data_reject() {
    let network = MockNetwork::new();
    network.respond_errors(&["not logged in"]);
    let env = seeded(network);
    let before = env.store().snapshot();

    let err = env
        .environment
        .commit_mutation(follow_config())
        .await
        .unwrap_err();
    assert!(matches!(err, MutationError::GraphQl(_)));
    assert_eq!(env.store().snapshot(), before);
}

#[tokio::test]
async fn opaque_rejection_is_not_reported() {
    let network = MockNetwork::new();
    network.fail(NetworkError::Rejected(json!({"code": 1})));
    let env = seeded(network);

    env.environment
        .commit_mutation(follow_config())
        .await
        .unwrap_err();
    assert_eq!(env.reporter.count(), 0);
    assert_eq!(env.toasts.count(), 1);
}

#[tokio::test]
async fn dropped_caller_still_settles_the_store() {
    let network = MockNetwork::new().with_delay(Duration::from_millis(10));
    network.push(Scripted::Fail(NetworkError::Transport("reset".into())));
    let env = seeded(network);
    let before = env.store().snapshot();

    {
        let environment = env.environment.clone();
        let call = tokio::spawn(async move { environment.commit_mutation(follow_config()).await });
        // let the call apply its layer and spawn settlement, then abandon it
        while env.store().pending_count() == 0 {
            tokio::task::yield_now().await;
        }
        call.abort();
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(env.store().pending_count(), 0);
    assert_eq!(env.store().snapshot(), before);
}

#[tokio::test]
async fn persisted_operations_send_ids() {
    let network = MockNetwork::new();
    network.respond(server_follow());
    let env = seeded(network);
    let environment = env
        .environment
        .clone()
        .with_persisted_queries(PersistedQueryMap::new().with_entry("FollowUserMutation", "hash-1"))
        .with_config(EnvironmentConfig::new().with_strict_persisted(true));

    environment.commit_mutation(follow_config()).await.unwrap();
    let requests = env.network.requests();
    assert_eq!(requests[0].persisted_id.as_deref(), Some("hash-1"));
    assert!(requests[0].query.is_none());
}

#[tokio::test]
async fn queries_publish_into_the_store() {
    const USER: OperationDescriptor = OperationDescriptor::query(
        "UserQuery",
        "query UserQuery($id: DBID!) { userById(id: $id) { __typename id username } }",
    );
    let network = MockNetwork::new();
    network.respond(json!({"userById": {"__typename": "GalleryUser", "id": "u9", "username": "zed"}}));
    let env = TestEnvironment::with_network(network);

    env.environment
        .execute_query(&USER, json!({"id": "u9"}), &DataId::root(), &Default::default())
        .await
        .unwrap();
    let user = env.store().lookup(&DataId::entity("GalleryUser", "u9")).unwrap();
    assert_eq!(user.get_scalar("username"), Some(&json!("zed")));
}

fn outcome() -> impl Strategy<Value = Scripted> {
    prop_oneof![
        Just(Scripted::Respond(vitrine_mutation::GraphQlResponse::from_data(server_follow()))),
        Just(Scripted::Fail(NetworkError::Transport("reset".into()))),
        Just(Scripted::Fail(NetworkError::Rejected(json!("nope")))),
        Just(Scripted::Drop),
        Just(Scripted::Respond(vitrine_mutation::GraphQlResponse::default())),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_every_invocation_settles_once_and_failures_restore(step in outcome()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let network = MockNetwork::new();
            network.push(step);
            let env = seeded(network);
            let before = env.store().snapshot();

            let result = env.environment.commit_mutation(follow_config()).await;
            assert_eq!(env.network.request_count(), 1);
            assert_eq!(env.store().pending_count(), 0);
            match result {
                Ok(_) => {
                    let user = env.store().lookup(&target()).unwrap();
                    assert_eq!(user.get_scalar("followerCount"), Some(&json!(7)));
                }
                Err(_) => assert_eq!(env.store().snapshot(), before),
            }
        });
    }
}

#[tokio::test]
async fn busy_tracker_is_reported_before_anything_is_sent() {
    let env = seeded(MockNetwork::new());
    let before = env.store().snapshot();
    let tracker = MutationTracker::new();
    tracker.begin().unwrap();

    let err = env
        .environment
        .commit_mutation(follow_config().with_tracker(tracker.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, MutationError::State(_)));
    assert_eq!(env.network.request_count(), 0);
    assert_eq!(env.store().snapshot(), before);
    assert_eq!(env.reporter.count(), 1);
    assert_eq!(env.toasts.toasts()[0].message, "Could not follow");
    assert_eq!(tracker.attempts(), 1);
}
