//! Callback-style network seam
//!
//! A [`Network`] receives one [`GraphQlRequest`] and an [`Observer`], and
//! reports back by calling exactly one of [`Observer::complete`] or
//! [`Observer::error`]. Both consume the observer, so a second settlement
//! cannot be expressed. The invoker side holds the matching [`Completion`].

use crate::error::{MutationError, NetworkError};
use crate::operation::OperationKind;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::oneshot;

/// One GraphQL request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlRequest {
    /// Operation name
    pub operation_name: String,
    /// Operation type
    pub kind: OperationKind,
    /// Full document text, when not persisted
    pub query: Option<String>,
    /// Persisted query id
    pub persisted_id: Option<String>,
    /// Variables object
    pub variables: Value,
}

impl GraphQlRequest {
    /// Request without a document
    #[must_use]
    pub fn new(operation_name: impl Into<String>, kind: OperationKind, variables: Value) -> Self {
        Self {
            operation_name: operation_name.into(),
            kind,
            query: None,
            persisted_id: None,
            variables,
        }
    }

    /// With full document text
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// With persisted query id
    #[must_use]
    pub fn with_persisted_id(mut self, id: impl Into<String>) -> Self {
        self.persisted_id = Some(id.into());
        self
    }

    /// Wire body
    ///
    /// Persisted requests use the `extensions.persistedQuery` form.
    #[must_use]
    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "operationName": self.operation_name,
            "variables": self.variables,
        });
        if let Some(query) = &self.query {
            body["query"] = Value::String(query.clone());
        }
        if let Some(id) = &self.persisted_id {
            body["extensions"] = json!({
                "persistedQuery": {"version": 1, "sha256Hash": id}
            });
        }
        body
    }
}

/// Error entry of a GraphQL response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlError {
    /// Message
    pub message: String,
    /// Response path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    /// Server extensions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQlError {
    /// Error with only a message
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: None,
        }
    }
}

/// GraphQL response body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQlResponse {
    /// Data, absent or null on failure
    #[serde(default)]
    pub data: Option<Value>,
    /// Errors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQlError>,
}

impl GraphQlResponse {
    /// Successful response
    #[must_use]
    pub fn from_data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// Failed response
    #[must_use]
    pub fn from_errors(errors: Vec<GraphQlError>) -> Self {
        Self { data: None, errors }
    }

    /// Data, or why there is none
    ///
    /// Data alongside errors counts as success; the errors are logged.
    ///
    /// # Errors
    /// - `MutationError::GraphQl` if there is no data and there are errors
    /// - `MutationError::MissingData` if there is neither
    pub fn into_data(self, operation: &str) -> Result<Value, MutationError> {
        match self.data {
            Some(data) if !data.is_null() => {
                for error in &self.errors {
                    tracing::warn!(operation, message = %error.message, "partial GraphQL error");
                }
                Ok(data)
            }
            _ if !self.errors.is_empty() => Err(MutationError::GraphQl(self.errors)),
            _ => Err(MutationError::MissingData {
                operation: operation.to_string(),
            }),
        }
    }
}

/// Settlement side handed to the network
#[derive(Debug)]
pub struct Observer {
    sender: oneshot::Sender<Result<GraphQlResponse, NetworkError>>,
}

impl Observer {
    /// Observer plus the completion the invoker awaits
    #[must_use]
    pub fn channel() -> (Self, Completion) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, Completion { receiver })
    }

    /// Report a response
    pub fn complete(self, response: GraphQlResponse) {
        // receiver gone means the invoker stopped listening (timeout)
        let _ = self.sender.send(Ok(response));
    }

    /// Report a transport failure
    pub fn error(self, error: NetworkError) {
        let _ = self.sender.send(Err(error));
    }

    /// Whether nobody is waiting anymore
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Invoker side of one request
#[derive(Debug)]
pub struct Completion {
    receiver: oneshot::Receiver<Result<GraphQlResponse, NetworkError>>,
}

impl Completion {
    /// Wait for the observer to settle
    ///
    /// # Errors
    /// - `MutationError::Network` if the observer reported an error
    /// - `MutationError::Abandoned` if the observer was dropped
    pub async fn wait(self, operation: &str) -> Result<GraphQlResponse, MutationError> {
        match self.receiver.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(error)) => Err(error.into()),
            Err(_) => Err(MutationError::Abandoned {
                operation: operation.to_string(),
            }),
        }
    }
}

/// GraphQL transport
///
/// Implementations must not block: start the request and settle the
/// observer later (e.g. from a spawned task).
pub trait Network: Send + Sync {
    /// Fire `request` and settle `observer` once
    fn execute(&self, request: GraphQlRequest, observer: Observer);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_body_uses_extensions() {
        let request = GraphQlRequest::new("FollowUserMutation", OperationKind::Mutation, json!({"userId": "u1"}))
            .with_persisted_id("abc");
        let body = request.to_body();
        assert_eq!(body["extensions"]["persistedQuery"]["sha256Hash"], "abc");
        assert!(body.get("query").is_none());
        assert_eq!(body["variables"]["userId"], "u1");
    }

    #[test]
    fn data_with_errors_is_success() {
        let response = GraphQlResponse {
            data: Some(json!({"followUser": null})),
            errors: vec![GraphQlError::new("partial")],
        };
        assert!(response.into_data("FollowUserMutation").is_ok());
    }

    #[test]
    fn errors_without_data_fail() {
        let err = GraphQlResponse::from_errors(vec![GraphQlError::new("boom")])
            .into_data("FollowUserMutation")
            .unwrap_err();
        assert!(matches!(err, MutationError::GraphQl(errors) if errors.len() == 1));

        let err = GraphQlResponse::default().into_data("FollowUserMutation").unwrap_err();
        assert!(matches!(err, MutationError::MissingData { .. }));
    }

    #[test]
    fn response_decodes_without_errors_field() {
        let response: GraphQlResponse = serde_json::from_value(json!({"data": {"viewer": null}})).unwrap();
        assert!(response.errors.is_empty());
    }

    #[tokio::test]
    async fn dropped_observer_is_abandoned() {
        let (observer, completion) = Observer::channel();
        drop(observer);
        let err = completion.wait("Op").await.unwrap_err();
        assert!(matches!(err, MutationError::Abandoned { .. }));
    }

    #[tokio::test]
    async fn observer_error_surfaces() {
        let (observer, completion) = Observer::channel();
        observer.error(NetworkError::Transport("reset".into()));
        let err = completion.wait("Op").await.unwrap_err();
        assert!(matches!(err, MutationError::Network(NetworkError::Transport(_))));
    }
}
