//! Error types for the mutation layer
//!
//! Three classes of failure reach a mutation caller:
//! - transport failures ([`NetworkError`]), surfaced as rejections
//! - typed error variants returned inside a valid payload ([`DomainError`]),
//!   discriminated on `__typename` after the mutation resolves
//! - local bookkeeping failures (unknown operation, store, state machine)

use crate::network::GraphQlError;
use crate::state::MutationState;
use serde_json::Value;
use std::path::PathBuf;
use vitrine_store::StoreError;

/// Transport-level failures reported by a [`Network`](crate::Network)
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkError {
    /// Connection could not be made or was cut
    #[error("transport failure: {0}")]
    Transport(String),

    /// Server answered with a non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body is not a GraphQL response
    #[error("invalid response body: {0}")]
    Decode(String),

    /// Transport gave up waiting
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Rejected with a value that is not an error
    #[error("request rejected with a non-error value: {0}")]
    Rejected(Value),
}

/// Error variants returned as valid mutation payloads
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// `ErrUserNotFound`
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// `ErrInvalidInput`
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// `ErrNotAuthorized`
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// `ErrDoesNotOwnWallet`
    #[error("wallet not owned by viewer: {0}")]
    DoesNotOwnWallet(String),

    /// `ErrGalleryNotFound`
    #[error("gallery not found: {0}")]
    GalleryNotFound(String),

    /// Any other `Err*` variant
    #[error("{typename}: {message}")]
    Other { typename: String, message: String },
}

impl DomainError {
    /// Map an error variant's `__typename` and message
    #[must_use]
    pub fn from_typename(typename: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match typename {
            "ErrUserNotFound" => Self::UserNotFound(message),
            "ErrInvalidInput" => Self::InvalidInput(message),
            "ErrNotAuthorized" => Self::NotAuthorized(message),
            "ErrDoesNotOwnWallet" => Self::DoesNotOwnWallet(message),
            "ErrGalleryNotFound" => Self::GalleryNotFound(message),
            other => Self::Other {
                typename: other.to_string(),
                message,
            },
        }
    }

    /// Server-provided message
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::UserNotFound(message)
            | Self::InvalidInput(message)
            | Self::NotAuthorized(message)
            | Self::DoesNotOwnWallet(message)
            | Self::GalleryNotFound(message)
            | Self::Other { message, .. } => message,
        }
    }
}

/// Invalid mutation state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal mutation state transition {from:?} -> {to:?}")]
pub struct StateError {
    /// State before
    pub from: MutationState,
    /// Requested state
    pub to: MutationState,
}

/// Persisted query map loading failures
#[derive(Debug, thiserror::Error)]
pub enum PersistedMapError {
    /// File could not be read
    #[error("failed to read persisted query map {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File is not a `{ "operation": "id" }` object
    #[error("invalid persisted query map: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors surfaced by mutation and query invocations
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    /// Transport failure
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// GraphQL errors and no data
    #[error("GraphQL errors: {}", join_messages(.0))]
    GraphQl(Vec<GraphQlError>),

    /// Response carried neither data nor errors
    #[error("response for {operation} carried no data")]
    MissingData { operation: String },

    /// No settlement within the request timeout
    #[error("{operation} did not settle within {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Network dropped the observer without settling
    #[error("{operation} was abandoned by the network layer")]
    Abandoned { operation: String },

    /// Operation missing from the persisted query map in strict mode
    #[error("operation {0} is not in the persisted query map")]
    UnknownOperation(String),

    /// Store rejected the payload or the optimistic update
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Typed error variant in the payload
    #[error("{0}")]
    Domain(#[from] DomainError),

    /// Payload field missing or not decodable
    #[error("payload field {field} could not be decoded: {reason}")]
    Payload { field: String, reason: String },

    /// Tracker refused the transition
    #[error("mutation state error: {0}")]
    State(#[from] StateError),
}

impl MutationError {
    /// Whether this error came from the transport
    #[inline]
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout { .. } | Self::Abandoned { .. }
        )
    }

    /// Typed error variant, if this is one
    #[inline]
    #[must_use]
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            Self::Domain(err) => Some(err),
            _ => None,
        }
    }
}

fn join_messages(errors: &[GraphQlError]) -> String {
    errors
        .iter()
        .map(|err| err.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from [`SyncTokensLock`](crate::SyncTokensLock)
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    /// A sync is already in flight
    #[error("token sync already in progress")]
    AlreadyLocked,
}

/// Result type alias for mutation operations
pub type MutationResult<T> = Result<T, MutationError>;
