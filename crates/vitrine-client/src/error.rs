//! Error types for the client crate

use std::path::PathBuf;
use vitrine_mutation::{LockError, MutationError, PersistedMapError};

/// Configuration loading failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File is not valid TOML for [`ClientConfig`](crate::ClientConfig)
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be rendered
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Device storage failures
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Backing file failure
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value does not decode
    #[error("storage value for {key} is invalid: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Value could not be encoded
    #[error("storage value could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Subscription channel failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubscriptionError {
    /// Connecting to the socket failed
    #[error("connection failed: {0}")]
    Connect(String),

    /// Server did not acknowledge `connection_init`
    #[error("connection not acknowledged: {0}")]
    NotAcknowledged(String),

    /// Channel is closed
    #[error("subscription channel closed")]
    Closed,

    /// Server sent an `error` message for a subscription
    #[error("subscription {operation} failed: {message}")]
    Server { operation: String, message: String },

    /// Frame could not be encoded or decoded
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Socket read or write failed after connecting
    #[error("socket error: {0}")]
    Socket(String),

    /// Operation missing from the persisted map in strict mode
    #[error("operation {0} is not persisted")]
    UnknownOperation(String),
}

/// Client-side input validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Gallery description over the limit
    #[error("description is {len} characters, the limit is {max}")]
    DescriptionTooLong { len: usize, max: usize },

    /// Required value is empty
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Errors surfaced by the gallery hooks
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Mutation or query failed
    #[error(transparent)]
    Mutation(#[from] MutationError),

    /// Input rejected before or after the request
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A token sync is already running
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Subscription channel failure
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// Configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Persisted query map could not be loaded
    #[error(transparent)]
    PersistedMap(#[from] PersistedMapError),
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
