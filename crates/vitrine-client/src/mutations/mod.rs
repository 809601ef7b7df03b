//! Gallery mutation hooks
//!
//! Each hook builds its variables, the optimistic response or updater, runs
//! the mutation through [`Environment::commit_mutation`] and discriminates
//! the typed payload. Transport failures were already routed by the
//! environment; typed error variants are routed here once decoded.

pub mod follow;
pub mod gallery;
pub mod notifications;
pub mod operations;
pub mod spam;
pub mod sync;
pub mod wallet;

use crate::error::ClientError;
use vitrine_mutation::{Environment, ErrorContext, MutationError, Rejection};
use vitrine_store::DataId;

pub use follow::{follow_user, follower_count, unfollow_user};
pub use gallery::{
    create_gallery, delete_gallery, update_gallery_info, validate_description,
    MAX_DESCRIPTION_LEN,
};
pub use notifications::{
    clear_notifications, notification_connection_keys, notification_subscriptions, unseen_count,
};
pub use spam::set_spam_preference;
pub use sync::{sync_tokens, Chain};
pub use wallet::remove_wallet;

pub(crate) const USER_TYPENAME: &str = "GalleryUser";
pub(crate) const VIEWER_TYPENAME: &str = "Viewer";
pub(crate) const GALLERY_TYPENAME: &str = "Gallery";
pub(crate) const WALLET_TYPENAME: &str = "Wallet";
pub(crate) const TOKEN_TYPENAME: &str = "Token";

/// Store id of a gallery user
#[inline]
#[must_use]
pub fn user_record(user_id: &str) -> DataId {
    DataId::entity(USER_TYPENAME, user_id)
}

/// Store id of the viewer
#[inline]
#[must_use]
pub fn viewer_record(viewer_id: &str) -> DataId {
    DataId::entity(VIEWER_TYPENAME, viewer_id)
}

/// Route a payload-level failure and hand it back
fn surface(environment: &Environment, context: &ErrorContext, error: MutationError) -> ClientError {
    environment
        .router()
        .route(&Rejection::classify(&error), context);
    error.into()
}

/// Drop links whose entity id is in `ids`
fn without_ids(links: Vec<DataId>, ids: &[String]) -> Vec<DataId> {
    links
        .into_iter()
        .filter(|link| {
            link.entity_id()
                .map_or(true, |id| !ids.iter().any(|removed| removed == id))
        })
        .collect()
}
