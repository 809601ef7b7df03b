//! Token sync
//!
//! Only one sync may run at a time per [`SyncTokensLock`]; a second call
//! while one is in flight fails fast with `LockError::AlreadyLocked`.

use super::operations::SYNC_TOKENS;
use super::surface;
use crate::error::ClientResult;
use serde::{Deserialize, Serialize};
use serde_json::json;
use vitrine_mutation::{
    decode_payload, DomainError, Environment, ErrorContext, ErrorMessage, MutationConfig,
    MutationTracker, PayloadVariant, SyncTokensLock, ToastPolicy,
};

/// Chain to sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chain {
    /// Ethereum mainnet
    Ethereum,
    /// Polygon PoS
    Polygon,
    /// Optimism
    Optimism,
    /// Arbitrum One
    Arbitrum,
    /// Tezos
    Tezos,
    /// Zora network
    Zora,
    /// Base
    Base,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum SyncResult {
    SyncTokensPayload {},
    ErrNotAuthorized(ErrorMessage),
}

impl PayloadVariant for SyncResult {
    type Ok = ();

    fn into_result(self) -> Result<(), DomainError> {
        match self {
            Self::SyncTokensPayload {} => Ok(()),
            Self::ErrNotAuthorized(err) => Err(DomainError::NotAuthorized(err.message)),
        }
    }
}

/// Refresh the viewer's tokens from chain
///
/// `tracker` follows the invocation so a caller can show progress.
///
/// # Errors
/// - `LockError::AlreadyLocked` if a sync holds `lock`
/// - the rejection or typed error variant otherwise
pub async fn sync_tokens(
    environment: &Environment,
    lock: &SyncTokensLock,
    chains: &[Chain],
    tracker: Option<MutationTracker>,
) -> ClientResult<()> {
    let guard = lock.lock()?;

    let context = ErrorContext::new(SYNC_TOKENS.name)
        .with_toast(ToastPolicy::Message("Unable to sync tokens".to_string()));
    let mut config = MutationConfig::new(SYNC_TOKENS, json!({ "chains": chains }))
        .with_context(context.clone());
    if let Some(tracker) = tracker {
        config = config.with_tracker(tracker);
    }
    let outcome = environment.commit_mutation(config).await;
    guard.unlock();

    let data = outcome?;
    decode_payload::<SyncResult>(&data, "syncTokens")
        .map_err(|err| surface(environment, &context, err))
}
