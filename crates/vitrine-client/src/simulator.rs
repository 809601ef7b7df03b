//! Mutation simulator
//!
//! Runs a seeded sequence of follow / unfollow / clear-notification
//! mutations against a scripted in-process server and checks after each
//! one:
//! - the optimistic change was visible while the request was in flight
//! - a transport failure restored the store exactly
//! - a typed error variant left the affected data as it was
//! - a success left the server's answer in the store, even when it differs
//!   from the optimistic guess
//! - nothing stays pending

use crate::mutations::{self, follower_count, unseen_count, user_record};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::sync::Arc;
use vitrine_mutation::{
    Environment, ErrorContext, ErrorReporter, ErrorRouter, GraphQlError, GraphQlRequest,
    GraphQlResponse, Network, NetworkError, Observer, Toast, ToastSink,
};
use vitrine_store::{DataId, NormalizeOptions, Store};

const VIEWER_ID: &str = "v1";
const VIEWER_USER: &str = "me";
const USERS: &[&str] = &["u1", "u2", "u3", "u4", "u5"];
const NOTIFICATION_TYPENAME: &str = "SomeoneFollowedYouNotification";

/// Simulator configuration
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Mutations to run
    pub mutations: u64,
    /// Probability that the server fails a mutation
    pub failure_rate: f64,
    /// Stop at the first violation
    pub stop_on_first_violation: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            mutations: 500,
            failure_rate: 0.2,
            stop_on_first_violation: false,
        }
    }
}

/// Simulated call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedMutation {
    /// Viewer follows a user
    Follow(String),
    /// Viewer unfollows a user
    Unfollow(String),
    /// Viewer clears notifications
    ClearNotifications,
}

/// How the scripted server answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    TransportFailure,
    GraphQlErrors,
    TypedError,
}

/// Property violated by a mutation
#[derive(Debug, Clone, PartialEq)]
pub enum Violation {
    /// Optimistic change not visible while in flight
    OptimisticNotVisible {
        mutation: SimulatedMutation,
        expected: i64,
        observed: Option<i64>,
    },
    /// Store differs from its pre-mutation snapshot after a rejection
    RollbackMismatch { mutation: SimulatedMutation },
    /// Affected data changed although the server returned an error variant
    TypedErrorChangedData {
        mutation: SimulatedMutation,
        before: i64,
        after: i64,
    },
    /// Store does not hold the server's answer after success
    NotSuperseded {
        mutation: SimulatedMutation,
        expected: i64,
        actual: i64,
    },
    /// Call resolved when it should have failed or the other way round
    UnexpectedOutcome {
        mutation: SimulatedMutation,
        detail: String,
    },
    /// Optimistic layers left behind
    PendingLeak { count: usize },
}

/// Simulation counters
#[derive(Debug, Clone, Default)]
pub struct SimulatorStats {
    /// Mutations started
    pub mutations_attempted: u64,
    /// Mutations resolved
    pub mutations_succeeded: u64,
    /// Transport or GraphQL rejections
    pub rejected: u64,
    /// Typed error variants
    pub typed_errors: u64,
    /// Successes whose server answer differed from the optimistic one
    pub server_diverged: u64,
    /// Errors sent to the reporter
    pub reports: u64,
    /// Toasts raised
    pub toasts: u64,
}

/// Final report
#[derive(Debug, Clone)]
pub struct SimulatorReport {
    /// Configuration used
    pub config: SimulatorConfig,
    /// Counters
    pub stats: SimulatorStats,
    /// Violations found
    pub violations: Vec<Violation>,
}

impl SimulatorReport {
    /// Whether every property held
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        let _ = writeln!(report, "=== Vitrine Mutation Simulator ===\n");
        let _ = writeln!(report, "Seed: {}", self.config.seed);
        let _ = writeln!(report, "Failure Rate: {:.2}", self.config.failure_rate);
        let _ = writeln!(report, "Mutations Attempted: {}", self.stats.mutations_attempted);
        let _ = writeln!(report, "Mutations Succeeded: {}", self.stats.mutations_succeeded);
        let _ = writeln!(report, "Rejected: {}", self.stats.rejected);
        let _ = writeln!(report, "Typed Errors: {}", self.stats.typed_errors);
        let _ = writeln!(report, "Server Diverged From Optimistic: {}", self.stats.server_diverged);
        let _ = writeln!(report, "Errors Reported: {}", self.stats.reports);
        let _ = writeln!(report, "Toasts: {}", self.stats.toasts);
        let _ = writeln!(report, "Violations: {}", self.violations.len());

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, violation) in self.violations.iter().enumerate() {
                let _ = writeln!(report, "{}. {violation:?}", i + 1);
            }
        }

        let _ = writeln!(
            report,
            "\n=== Result: {} ===",
            if self.passed() { "PASS" } else { "FAIL" }
        );
        report
    }
}

/// Server-side truth
#[derive(Debug, Default)]
struct ServerState {
    followers: BTreeMap<String, BTreeSet<String>>,
    notifications: Vec<(String, bool)>,
    strangers: u64,
}

/// What the client showed when the request left
#[derive(Debug, Default, Clone, Copy)]
struct InFlight {
    followers: Option<i64>,
    unseen: Option<i64>,
}

/// In-process server answering from [`ServerState`]
struct ScriptedServer {
    store: Arc<Store>,
    state: Mutex<ServerState>,
    rng: Mutex<StdRng>,
    failure_rate: f64,
    last_outcome: Mutex<Option<Outcome>>,
    in_flight: Mutex<InFlight>,
    diverged: Mutex<bool>,
}

impl ScriptedServer {
    fn pick_outcome(&self) -> Outcome {
        let mut rng = self.rng.lock();
        if !rng.random_bool(self.failure_rate) {
            return Outcome::Success;
        }
        match rng.random_range(0..3) {
            0 => Outcome::TransportFailure,
            1 => Outcome::GraphQlErrors,
            _ => Outcome::TypedError,
        }
    }

    fn answer(
        &self,
        request: &GraphQlRequest,
        outcome: Outcome,
    ) -> Result<GraphQlResponse, NetworkError> {
        let field = match request.operation_name.as_str() {
            "FollowUserMutation" => "followUser",
            "UnfollowUserMutation" => "unfollowUser",
            "ClearNotificationsMutation" => "clearAllNotifications",
            other => return Err(NetworkError::Transport(format!("unscripted {other}"))),
        };
        match outcome {
            Outcome::TransportFailure => {
                return Err(NetworkError::Transport("simulated outage".to_string()))
            }
            Outcome::GraphQlErrors => {
                return Ok(GraphQlResponse::from_errors(vec![GraphQlError::new(
                    "simulated resolver failure",
                )]))
            }
            Outcome::TypedError => {
                let typename = if field == "clearAllNotifications" {
                    "ErrNotAuthorized"
                } else {
                    "ErrUserNotFound"
                };
                return Ok(GraphQlResponse::from_data(json!({
                    field: {"__typename": typename, "message": "simulated"}
                })));
            }
            Outcome::Success => {}
        }

        let mut state = self.state.lock();
        let payload = match field {
            "clearAllNotifications" => {
                for (_, seen) in &mut state.notifications {
                    *seen = true;
                }
                let notifications: Vec<Value> = state
                    .notifications
                    .iter()
                    .map(|(id, seen)| json!({"__typename": NOTIFICATION_TYPENAME, "id": id, "seen": seen}))
                    .collect();
                json!({"__typename": "ClearAllNotificationsPayload", "notifications": notifications})
            }
            _ => {
                let user_id = request
                    .variables
                    .get("userId")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let diverge = self.rng.lock().random_bool(0.2);
                state.strangers += 1;
                let stranger = format!("s{}", state.strangers);
                let followers = state.followers.entry(user_id.clone()).or_default();
                if field == "followUser" {
                    followers.insert(VIEWER_USER.to_string());
                } else {
                    followers.remove(VIEWER_USER);
                }
                if diverge {
                    followers.insert(stranger);
                    *self.diverged.lock() = true;
                }
                let typename = if field == "followUser" {
                    "FollowUserPayload"
                } else {
                    "UnfollowUserPayload"
                };
                json!({"__typename": typename, "user": user_payload(&user_id, &state)})
            }
        };
        Ok(GraphQlResponse::from_data(json!({ field: payload })))
    }
}

impl Network for ScriptedServer {
    fn execute(&self, request: GraphQlRequest, observer: Observer) {
        let followers = request
            .variables
            .get("userId")
            .and_then(Value::as_str)
            .map(|user_id| to_i64(follower_count(&self.store, user_id)));
        *self.in_flight.lock() = InFlight {
            followers,
            unseen: unseen_count(&self.store, VIEWER_ID),
        };

        let outcome = self.pick_outcome();
        *self.last_outcome.lock() = Some(outcome);
        match self.answer(&request, outcome) {
            Ok(response) => observer.complete(response),
            Err(err) => observer.error(err),
        }
    }
}

/// Counts routed errors and toasts instead of logging them
#[derive(Default)]
struct Tally {
    reports: Mutex<u64>,
    toasts: Mutex<u64>,
}

impl ErrorReporter for Tally {
    fn report(&self, _error: &(dyn std::error::Error + 'static), _context: &ErrorContext) {
        *self.reports.lock() += 1;
    }
}

impl ToastSink for Tally {
    fn push(&self, _toast: Toast) {
        *self.toasts.lock() += 1;
    }
}

fn user_payload(user_id: &str, state: &ServerState) -> Value {
    let followers: Vec<Value> = state
        .followers
        .get(user_id)
        .into_iter()
        .flatten()
        .map(|id| json!({"__typename": "GalleryUser", "id": id}))
        .collect();
    json!({"__typename": "GalleryUser", "id": user_id, "followers": followers})
}

fn to_i64(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

fn seed_payload(state: &ServerState) -> Value {
    let users: Vec<Value> = USERS
        .iter()
        .map(|id| {
            let followers: Vec<Value> = state
                .followers
                .get(*id)
                .into_iter()
                .flatten()
                .map(|f| json!({"__typename": "GalleryUser", "id": f}))
                .collect();
            json!({"__typename": "GalleryUser", "id": id, "followers": followers})
        })
        .collect();
    let edges: Vec<Value> = state
        .notifications
        .iter()
        .enumerate()
        .map(|(index, (id, seen))| {
            json!({"cursor": format!("c{index}"), "node": {"__typename": NOTIFICATION_TYPENAME, "id": id, "seen": seen}})
        })
        .collect();
    let unseen = state.notifications.iter().filter(|(_, seen)| !seen).count();
    json!({
        "viewer": {
            "__typename": "Viewer",
            "id": VIEWER_ID,
            "user": {"__typename": "GalleryUser", "id": VIEWER_USER},
            "notifications": {
                "unseenCount": unseen,
                "pageInfo": {"hasNextPage": false},
                "edges": edges
            }
        },
        "users": users
    })
}

fn initial_state(rng: &mut StdRng) -> ServerState {
    let mut state = ServerState::default();
    for user in USERS {
        let mut followers = BTreeSet::new();
        for other in USERS {
            if other != user && rng.random_bool(0.3) {
                followers.insert((*other).to_string());
            }
        }
        if rng.random_bool(0.5) {
            followers.insert(VIEWER_USER.to_string());
        }
        state.followers.insert((*user).to_string(), followers);
    }
    state.notifications = (0..rng.random_range(1..6))
        .map(|i| (format!("n{i}"), false))
        .collect();
    state
}

fn pick_mutation(rng: &mut StdRng, store: &Store) -> SimulatedMutation {
    let roll = rng.random_range(0..10);
    if roll == 0 {
        return SimulatedMutation::ClearNotifications;
    }
    let user = USERS[rng.random_range(0..USERS.len())].to_string();
    let follows = store
        .lookup(&user_record(&user))
        .is_some_and(|record| record.get_links("followers").contains(&user_record(VIEWER_USER)));
    if follows {
        SimulatedMutation::Unfollow(user)
    } else {
        SimulatedMutation::Follow(user)
    }
}

fn displayed_followers(store: &Store, user_id: &str) -> Vec<String> {
    store
        .lookup(&user_record(user_id))
        .map(|record| {
            record
                .get_links("followers")
                .iter()
                .filter_map(|link| link.entity_id().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Affected count for `mutation`: followers of the target or unseen count
fn affected(store: &Store, mutation: &SimulatedMutation) -> i64 {
    match mutation {
        SimulatedMutation::Follow(user) | SimulatedMutation::Unfollow(user) => {
            to_i64(follower_count(store, user))
        }
        SimulatedMutation::ClearNotifications => unseen_count(store, VIEWER_ID).unwrap_or(0),
    }
}

/// Run the simulator
pub async fn run_simulator(config: SimulatorConfig) -> SimulatorReport {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let state = initial_state(&mut rng);
    let server_rng = StdRng::seed_from_u64(rng.random());

    let store = Arc::new(Store::new());
    if let Err(err) =
        store.publish_response(&seed_payload(&state), &DataId::root(), &NormalizeOptions::new())
    {
        tracing::error!(error = %err, "simulator seed did not normalize");
    }

    let server = Arc::new(ScriptedServer {
        store: Arc::clone(&store),
        state: Mutex::new(state),
        rng: Mutex::new(server_rng),
        failure_rate: config.failure_rate.clamp(0.0, 1.0),
        last_outcome: Mutex::new(None),
        in_flight: Mutex::new(InFlight::default()),
        diverged: Mutex::new(false),
    });
    let tally = Arc::new(Tally::default());
    let network: Arc<dyn Network> = Arc::clone(&server) as Arc<dyn Network>;
    let environment = Environment::new(Arc::clone(&store), network).with_router(ErrorRouter::new(
        Arc::clone(&tally) as Arc<dyn ErrorReporter>,
        Arc::clone(&tally) as Arc<dyn ToastSink>,
    ));

    let mut stats = SimulatorStats::default();
    let mut violations = Vec::new();

    for _ in 0..config.mutations {
        let mutation = pick_mutation(&mut rng, &store);
        let before_snapshot = store.snapshot();
        let before = affected(&store, &mutation);
        *server.diverged.lock() = false;
        stats.mutations_attempted += 1;

        let (result, expected_optimistic) = match &mutation {
            SimulatedMutation::Follow(user) => {
                let followers = displayed_followers(&store, user);
                let expected = to_i64(
                    followers
                        .iter()
                        .filter(|id| id.as_str() != VIEWER_USER)
                        .count()
                        + 1,
                );
                (
                    mutations::follow_user(&environment, user, VIEWER_USER, &followers).await,
                    expected,
                )
            }
            SimulatedMutation::Unfollow(user) => {
                let followers = displayed_followers(&store, user);
                let expected = to_i64(
                    followers
                        .iter()
                        .filter(|id| id.as_str() != VIEWER_USER)
                        .count(),
                );
                (
                    mutations::unfollow_user(&environment, user, VIEWER_USER, &followers).await,
                    expected,
                )
            }
            SimulatedMutation::ClearNotifications => (
                mutations::clear_notifications(&environment, VIEWER_ID, &[]).await,
                0,
            ),
        };

        let in_flight = *server.in_flight.lock();
        let observed = match mutation {
            SimulatedMutation::ClearNotifications => in_flight.unseen,
            _ => in_flight.followers,
        };
        if observed != Some(expected_optimistic) {
            violations.push(Violation::OptimisticNotVisible {
                mutation: mutation.clone(),
                expected: expected_optimistic,
                observed,
            });
        }

        let outcome = server.last_outcome.lock().take();
        let after = affected(&store, &mutation);
        match (outcome, &result) {
            (Some(Outcome::Success), Ok(())) => {
                stats.mutations_succeeded += 1;
                let expected = match &mutation {
                    SimulatedMutation::Follow(user) | SimulatedMutation::Unfollow(user) => {
                        to_i64(server.state.lock().followers.get(user).map_or(0, BTreeSet::len))
                    }
                    SimulatedMutation::ClearNotifications => 0,
                };
                if *server.diverged.lock() {
                    stats.server_diverged += 1;
                }
                if after != expected {
                    violations.push(Violation::NotSuperseded {
                        mutation: mutation.clone(),
                        expected,
                        actual: after,
                    });
                }
            }
            (Some(Outcome::TransportFailure | Outcome::GraphQlErrors), Err(_)) => {
                stats.rejected += 1;
                if store.snapshot() != before_snapshot {
                    violations.push(Violation::RollbackMismatch {
                        mutation: mutation.clone(),
                    });
                }
            }
            (Some(Outcome::TypedError), Err(_)) => {
                stats.typed_errors += 1;
                if after != before {
                    violations.push(Violation::TypedErrorChangedData {
                        mutation: mutation.clone(),
                        before,
                        after,
                    });
                }
            }
            (outcome, result) => violations.push(Violation::UnexpectedOutcome {
                mutation: mutation.clone(),
                detail: format!("server {outcome:?}, client {result:?}"),
            }),
        }

        let pending = store.pending_count();
        if pending != 0 {
            violations.push(Violation::PendingLeak { count: pending });
        }
        if config.stop_on_first_violation && !violations.is_empty() {
            break;
        }
    }

    stats.reports = *tally.reports.lock();
    stats.toasts = *tally.toasts.lock();
    SimulatorReport {
        config,
        stats,
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_run_passes() {
        let report = run_simulator(SimulatorConfig {
            mutations: 200,
            ..SimulatorConfig::default()
        })
        .await;
        assert!(report.passed(), "{}", report.generate_text());
        assert_eq!(report.stats.mutations_attempted, 200);
        assert!(report.stats.rejected + report.stats.typed_errors > 0);
    }

    #[tokio::test]
    async fn same_seed_same_stats() {
        let config = SimulatorConfig {
            seed: 7,
            mutations: 50,
            ..SimulatorConfig::default()
        };
        let a = run_simulator(config.clone()).await;
        let b = run_simulator(config).await;
        assert_eq!(a.stats.mutations_succeeded, b.stats.mutations_succeeded);
        assert_eq!(a.stats.rejected, b.stats.rejected);
        assert_eq!(a.stats.server_diverged, b.stats.server_diverged);
    }

    #[tokio::test]
    async fn failure_free_run_never_rejects() {
        let report = run_simulator(SimulatorConfig {
            failure_rate: 0.0,
            mutations: 30,
            ..SimulatorConfig::default()
        })
        .await;
        assert!(report.passed(), "{}", report.generate_text());
        assert_eq!(report.stats.mutations_succeeded, 30);
        assert!(report.generate_text().contains("Result: PASS"));
    }
}
