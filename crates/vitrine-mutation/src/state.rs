//! Per-invocation mutation state machine
//!
//! `Idle → Pending → Succeeded | Failed`. Both end states are terminal for
//! the invocation; a retry is a fresh `begin`, never automatic.

use crate::error::StateError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Mutation lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationState {
    /// Not started
    #[default]
    Idle,
    /// Request in flight
    Pending,
    /// Settled with the server payload
    Succeeded,
    /// Settled with an error
    Failed,
}

impl MutationState {
    /// Whether the invocation has settled
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// States reachable from `from`
#[must_use]
pub fn allowed_transitions(from: MutationState) -> &'static [MutationState] {
    use MutationState::{Failed, Idle, Pending, Succeeded};
    match from {
        Idle | Succeeded | Failed => &[Pending],
        Pending => &[Succeeded, Failed],
    }
}

/// Check a transition
///
/// # Errors
/// Returns `StateError` if `to` is not reachable from `from`
pub fn validate_transition(from: MutationState, to: MutationState) -> Result<(), StateError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StateError { from, to })
    }
}

/// Shared view of one mutation call site's state
///
/// Clones observe the same state, so a screen can hold one while the
/// environment drives it.
#[derive(Debug, Clone, Default)]
pub struct MutationTracker {
    inner: Arc<Mutex<TrackerInner>>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    state: MutationState,
    attempts: u32,
}

impl MutationTracker {
    /// Create idle tracker
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> MutationState {
        self.inner.lock().state
    }

    /// Number of `begin` calls accepted
    #[inline]
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.inner.lock().attempts
    }

    /// Move to `Pending`
    ///
    /// # Errors
    /// Returns `StateError` while already pending
    pub fn begin(&self) -> Result<(), StateError> {
        let mut inner = self.inner.lock();
        validate_transition(inner.state, MutationState::Pending)?;
        inner.state = MutationState::Pending;
        inner.attempts += 1;
        Ok(())
    }

    /// Move to `Succeeded`
    ///
    /// # Errors
    /// Returns `StateError` unless pending
    pub fn succeed(&self) -> Result<(), StateError> {
        self.transition(MutationState::Succeeded)
    }

    /// Move to `Failed`
    ///
    /// # Errors
    /// Returns `StateError` unless pending
    pub fn fail(&self) -> Result<(), StateError> {
        self.transition(MutationState::Failed)
    }

    fn transition(&self, to: MutationState) -> Result<(), StateError> {
        let mut inner = self.inner.lock();
        validate_transition(inner.state, to)?;
        inner.state = to;
        Ok(())
    }
}
