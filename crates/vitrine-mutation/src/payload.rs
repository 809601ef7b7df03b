//! Typed mutation payloads
//!
//! Mutation fields return a union of one success type and several `Err*`
//! types. Each call site models the union as an enum tagged on
//! `__typename` and implements [`PayloadVariant`] to split it into the
//! success value or a [`DomainError`]. `Err*` typenames the enum does not
//! list still come back as [`DomainError::Other`] instead of a decode error.
//!
//! A typed error is still a successful response, so the store commits it.
//! Commit-time updaters that rewrite entity data are wrapped with
//! [`on_success`] so an `Err*` answer leaves the cache as it was.

use crate::error::{DomainError, MutationError};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use vitrine_store::Updater;

/// Body shared by every `Err*` variant
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorMessage {
    /// Server message
    #[serde(default)]
    pub message: String,
}

/// Tagged payload union
pub trait PayloadVariant: DeserializeOwned {
    /// Success value
    type Ok;

    /// Split into success or typed error
    ///
    /// # Errors
    /// Returns the domain error for `Err*` variants
    fn into_result(self) -> Result<Self::Ok, DomainError>;
}

/// Decode `data[field]` as `T` and discriminate it
///
/// # Errors
/// - `MutationError::Domain` for error variants
/// - `MutationError::Payload` if the field is missing or does not decode
pub fn decode_payload<T: PayloadVariant>(data: &Value, field: &str) -> Result<T::Ok, MutationError> {
    let payload = data
        .get(field)
        .filter(|value| !value.is_null())
        .ok_or_else(|| MutationError::Payload {
            field: field.to_string(),
            reason: "missing".to_string(),
        })?;

    match T::deserialize(payload) {
        Ok(variant) => Ok(variant.into_result()?),
        Err(err) => match error_variant(payload) {
            Some(domain) => Err(domain.into()),
            None => Err(MutationError::Payload {
                field: field.to_string(),
                reason: err.to_string(),
            }),
        },
    }
}

/// Run `updater` only when `data[field]` decodes to the success variant of `T`
#[must_use]
pub fn on_success<T: PayloadVariant + 'static>(field: &'static str, updater: Updater) -> Updater {
    Arc::new(move |proxy, data| match decode_payload::<T>(data, field) {
        Ok(_) => updater(proxy, data),
        Err(err) => tracing::debug!(field, error = %err, "commit updater skipped"),
    })
}

fn error_variant(payload: &Value) -> Option<DomainError> {
    let typename = payload.get("__typename")?.as_str()?;
    if !typename.starts_with("Err") {
        return None;
    }
    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Some(DomainError::from_typename(typename, message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    #[serde(tag = "__typename")]
    enum FollowPayload {
        FollowUserPayload { viewer: Value },
        ErrUserNotFound(ErrorMessage),
        ErrInvalidInput(ErrorMessage),
    }

    impl PayloadVariant for FollowPayload {
        type Ok = Value;

        fn into_result(self) -> Result<Value, DomainError> {
            match self {
                Self::FollowUserPayload { viewer } => Ok(viewer),
                Self::ErrUserNotFound(err) => Err(DomainError::UserNotFound(err.message)),
                Self::ErrInvalidInput(err) => Err(DomainError::InvalidInput(err.message)),
            }
        }
    }

    #[test]
    fn success_variant() {
        let data = json!({"followUser": {"__typename": "FollowUserPayload", "viewer": {"id": "v1"}}});
        let viewer = decode_payload::<FollowPayload>(&data, "followUser").unwrap();
        assert_eq!(viewer["id"], "v1");
    }

    #[test]
    fn listed_error_variant() {
        let data = json!({"followUser": {"__typename": "ErrUserNotFound", "message": "gone"}});
        let err = decode_payload::<FollowPayload>(&data, "followUser").unwrap_err();
        assert_eq!(err.as_domain(), Some(&DomainError::UserNotFound("gone".into())));
    }

    #[test]
    fn unlisted_error_variant_is_other() {
        let data = json!({"followUser": {"__typename": "ErrNotAuthorized", "message": "login"}});
        let err = decode_payload::<FollowPayload>(&data, "followUser").unwrap_err();
        assert_eq!(err.as_domain(), Some(&DomainError::NotAuthorized("login".into())));
    }

    #[test]
    fn updater_runs_only_for_success() {
        use vitrine_store::{DataId, RecordSource, StoreProxy};

        let ran: Updater = Arc::new(|proxy, _data| {
            proxy.create(DataId::entity("GalleryUser", "u1"), "GalleryUser");
        });
        let gated = on_success::<FollowPayload>("followUser", ran);

        let mut sink = RecordSource::new();
        let refused = json!({"followUser": {"__typename": "ErrUserNotFound", "message": "gone"}});
        gated(&mut StoreProxy::new(None, &mut sink), &refused);
        assert!(sink.is_empty());

        let accepted = json!({"followUser": {"__typename": "FollowUserPayload", "viewer": {}}});
        gated(&mut StoreProxy::new(None, &mut sink), &accepted);
        assert!(!sink.is_empty());
    }

    #[test]
    fn missing_or_unknown_payloads() {
        let err = decode_payload::<FollowPayload>(&json!({"followUser": null}), "followUser").unwrap_err();
        assert!(matches!(err, MutationError::Payload { .. }));

        let data = json!({"followUser": {"__typename": "Surprise"}});
        let err = decode_payload::<FollowPayload>(&data, "followUser").unwrap_err();
        assert!(matches!(err, MutationError::Payload { .. }));
    }
}
