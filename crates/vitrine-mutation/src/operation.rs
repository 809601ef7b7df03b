//! Operation descriptors and the persisted query map
//!
//! Operations are compiled into the client as static documents. At build
//! time a JSON map `{ "<operation name>": "<persisted id>" }` is generated;
//! requests for mapped operations carry only the id.

use crate::error::{MutationError, PersistedMapError};
use crate::network::GraphQlRequest;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// GraphQL operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Read
    Query,
    /// Write
    Mutation,
    /// Push stream
    Subscription,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        };
        f.write_str(name)
    }
}

/// Named GraphQL operation with its document text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationDescriptor {
    /// Operation name, also the persisted map key
    pub name: &'static str,
    /// Operation type
    pub kind: OperationKind,
    /// Document text
    pub text: &'static str,
}

impl OperationDescriptor {
    /// Query descriptor
    #[must_use]
    pub const fn query(name: &'static str, text: &'static str) -> Self {
        Self {
            name,
            kind: OperationKind::Query,
            text,
        }
    }

    /// Mutation descriptor
    #[must_use]
    pub const fn mutation(name: &'static str, text: &'static str) -> Self {
        Self {
            name,
            kind: OperationKind::Mutation,
            text,
        }
    }

    /// Subscription descriptor
    #[must_use]
    pub const fn subscription(name: &'static str, text: &'static str) -> Self {
        Self {
            name,
            kind: OperationKind::Subscription,
            text,
        }
    }
}

/// Operation name to persisted query id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistedQueryMap {
    entries: BTreeMap<String, String>,
}

impl PersistedQueryMap {
    /// Create empty map
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the generated JSON document
    ///
    /// # Errors
    /// Returns error if the document is not a string-to-string object
    pub fn from_json(json: &str) -> Result<Self, PersistedMapError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load the generated JSON file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PersistedMapError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| PersistedMapError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// With an entry
    #[must_use]
    pub fn with_entry(mut self, operation: impl Into<String>, id: impl Into<String>) -> Self {
        self.entries.insert(operation.into(), id.into());
        self
    }

    /// Persisted id for `operation`
    #[inline]
    #[must_use]
    pub fn resolve(&self, operation: &str) -> Option<&str> {
        self.entries.get(operation).map(String::as_str)
    }

    /// Mapped operation names
    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of mapped operations
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the request for `descriptor`
    ///
    /// Mapped operations are sent by id; unmapped ones carry the full text
    /// unless `strict` is set.
    ///
    /// # Errors
    /// Returns `MutationError::UnknownOperation` for unmapped operations in
    /// strict mode
    pub fn request(
        &self,
        descriptor: &OperationDescriptor,
        variables: Value,
        strict: bool,
    ) -> Result<GraphQlRequest, MutationError> {
        let request = GraphQlRequest::new(descriptor.name, descriptor.kind, variables);
        match self.resolve(descriptor.name) {
            Some(id) => Ok(request.with_persisted_id(id)),
            None if strict => Err(MutationError::UnknownOperation(descriptor.name.to_string())),
            None => Ok(request.with_query(descriptor.text)),
        }
    }
}
