//! Wallet removal

use super::operations::REMOVE_WALLET;
use super::{surface, user_record, without_ids};
use crate::error::{ClientResult, ValidationError};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use vitrine_mutation::{
    decode_payload, on_success, DomainError, Environment, ErrorContext, ErrorMessage, MutationConfig,
    PayloadVariant, ToastPolicy,
};
use vitrine_store::Updater;

const WALLETS: &str = "wallets";
const REMOVED_FIELD: &str = "removeUserWallets";

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum RemoveResult {
    RemoveUserWalletsPayload {},
    ErrDoesNotOwnWallet(ErrorMessage),
    ErrNotAuthorized(ErrorMessage),
}

impl PayloadVariant for RemoveResult {
    type Ok = ();

    fn into_result(self) -> Result<(), DomainError> {
        match self {
            Self::RemoveUserWalletsPayload {} => Ok(()),
            Self::ErrDoesNotOwnWallet(err) => Err(DomainError::DoesNotOwnWallet(err.message)),
            Self::ErrNotAuthorized(err) => Err(DomainError::NotAuthorized(err.message)),
        }
    }
}

/// Remove wallets from the viewer's account
///
/// The wallets leave the viewer's wallet list immediately and come back if
/// the server refuses.
///
/// # Errors
/// - `ValidationError::Empty` when `wallet_ids` is empty
/// - the rejection or typed error variant otherwise
pub async fn remove_wallet(
    environment: &Environment,
    wallet_ids: &[String],
    viewer_user_id: &str,
) -> ClientResult<()> {
    if wallet_ids.is_empty() {
        return Err(ValidationError::Empty("walletIds").into());
    }

    let user = user_record(viewer_user_id);
    let removed = wallet_ids.to_vec();
    let updater: Updater = Arc::new(move |proxy, _data| {
        let wallets = without_ids(proxy.get_linked_records(&user, WALLETS), &removed);
        proxy.set_linked_records(&user, WALLETS, wallets);
    });

    let context = ErrorContext::new(REMOVE_WALLET.name)
        .with_tag("walletIds", wallet_ids.join(","))
        .with_toast(ToastPolicy::ErrorText);
    let config = MutationConfig::new(REMOVE_WALLET, json!({ "walletIds": wallet_ids }))
        .with_optimistic_updater(Arc::clone(&updater))
        .with_updater(on_success::<RemoveResult>(REMOVED_FIELD, updater))
        .with_context(context.clone());
    let data = environment.commit_mutation(config).await?;
    decode_payload::<RemoveResult>(&data, REMOVED_FIELD)
        .map_err(|err| surface(environment, &context, err))
}
