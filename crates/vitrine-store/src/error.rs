//! Error types for the store
//!
//! - Normalization failures (response payload → records)
//! - Optimistic layer bookkeeping

use crate::data_id::DataId;
use crate::store::MutationId;

/// Errors while normalizing a response payload
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// Payload root is not a JSON object
    #[error("payload for {0} is not an object")]
    NotAnObject(DataId),

    /// Object carries an `id` but no `__typename`
    #[error("object at {parent}.{field} has an id but no __typename")]
    MissingTypename { parent: DataId, field: String },

    /// List mixes objects and scalars
    #[error("list at {parent}.{field} mixes objects and scalars")]
    MixedList { parent: DataId, field: String },

    /// `pageInfo` of a connection does not decode
    #[error("invalid pageInfo for connection {key}: {source}")]
    InvalidPageInfo {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl NormalizeError {
    /// Create missing typename error
    pub fn missing_typename(parent: &DataId, field: impl Into<String>) -> Self {
        Self::MissingTypename {
            parent: parent.clone(),
            field: field.into(),
        }
    }
}

/// Errors from store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An optimistic layer with this id is already pending
    #[error("mutation {0} already has a pending optimistic layer")]
    DuplicateMutation(MutationId),

    /// Payload could not be normalized
    #[error("normalization failed: {0}")]
    Normalize(#[from] NormalizeError),
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
