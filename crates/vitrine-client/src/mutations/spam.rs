//! Spam marking for tokens

use super::operations::SET_SPAM_PREFERENCE;
use super::{surface, TOKEN_TYPENAME};
use crate::error::{ClientResult, ValidationError};
use serde::Deserialize;
use serde_json::json;
use vitrine_mutation::{
    decode_payload, entity, DomainError, Environment, ErrorContext, ErrorMessage,
    MutationConfig, OptimisticResponse, PayloadVariant,
};

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum SpamResult {
    SetSpamPreferencePayload {},
    ErrNotAuthorized(ErrorMessage),
}

impl PayloadVariant for SpamResult {
    type Ok = ();

    fn into_result(self) -> Result<(), DomainError> {
        match self {
            Self::SetSpamPreferencePayload {} => Ok(()),
            Self::ErrNotAuthorized(err) => Err(DomainError::NotAuthorized(err.message)),
        }
    }
}

/// Mark tokens as spam (or not) for the viewer
///
/// # Errors
/// - `ValidationError::Empty` when `token_ids` is empty
/// - the rejection or typed error variant otherwise
pub async fn set_spam_preference(
    environment: &Environment,
    token_ids: &[String],
    is_spam: bool,
) -> ClientResult<()> {
    if token_ids.is_empty() {
        return Err(ValidationError::Empty("tokens").into());
    }

    let optimistic = OptimisticResponse::payload("setSpamPreference", "SetSpamPreferencePayload")
        .field(
            "tokens",
            token_ids
                .iter()
                .map(|id| entity(TOKEN_TYPENAME, id).with("isSpamByUser", is_spam).into())
                .collect::<Vec<serde_json::Value>>(),
        );
    let context =
        ErrorContext::new(SET_SPAM_PREFERENCE.name).with_tag("isSpam", is_spam.to_string());
    let config = MutationConfig::new(
        SET_SPAM_PREFERENCE,
        json!({ "tokens": token_ids, "isSpam": is_spam }),
    )
    .with_optimistic_response(optimistic)
    .with_context(context.clone());
    let data = environment.commit_mutation(config).await?;
    decode_payload::<SpamResult>(&data, "setSpamPreference")
        .map_err(|err| surface(environment, &context, err))
}
