//! Follow / unfollow
//!
//! The optimistic response carries the target's full follower list with the
//! viewer added (or removed), so the follower count moves by one before the
//! server answers.

use super::operations::{FOLLOW_USER, UNFOLLOW_USER};
use super::{surface, user_record, USER_TYPENAME};
use crate::error::ClientResult;
use serde::Deserialize;
use serde_json::json;
use vitrine_mutation::{
    decode_payload, entity, DomainError, Environment, ErrorContext, ErrorMessage,
    MutationConfig, OperationDescriptor, OptimisticResponse, PayloadVariant, ToastPolicy,
};
use vitrine_store::Store;

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum FollowResult {
    FollowUserPayload {},
    ErrUserNotFound(ErrorMessage),
    ErrInvalidInput(ErrorMessage),
}

impl PayloadVariant for FollowResult {
    type Ok = ();

    fn into_result(self) -> Result<(), DomainError> {
        match self {
            Self::FollowUserPayload {} => Ok(()),
            Self::ErrUserNotFound(err) => Err(DomainError::UserNotFound(err.message)),
            Self::ErrInvalidInput(err) => Err(DomainError::InvalidInput(err.message)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "__typename")]
enum UnfollowResult {
    UnfollowUserPayload {},
    ErrUserNotFound(ErrorMessage),
    ErrInvalidInput(ErrorMessage),
}

impl PayloadVariant for UnfollowResult {
    type Ok = ();

    fn into_result(self) -> Result<(), DomainError> {
        match self {
            Self::UnfollowUserPayload {} => Ok(()),
            Self::ErrUserNotFound(err) => Err(DomainError::UserNotFound(err.message)),
            Self::ErrInvalidInput(err) => Err(DomainError::InvalidInput(err.message)),
        }
    }
}

/// Follow `user_id` as `viewer_user_id`
///
/// `follower_ids` is the target's follower list as currently displayed.
///
/// # Errors
/// Returns the rejection or the typed error variant; the optimistic
/// follower is rolled back in both cases
pub async fn follow_user(
    environment: &Environment,
    user_id: &str,
    viewer_user_id: &str,
    follower_ids: &[String],
) -> ClientResult<()> {
    let mut followers: Vec<&str> = follower_ids
        .iter()
        .map(String::as_str)
        .filter(|id| *id != viewer_user_id)
        .collect();
    followers.push(viewer_user_id);

    let context = context(&FOLLOW_USER, user_id, "Unable to follow this user");
    let data = commit(
        environment,
        &FOLLOW_USER,
        ("followUser", "FollowUserPayload"),
        user_id,
        &followers,
        &context,
    )
    .await?;
    decode_payload::<FollowResult>(&data, "followUser")
        .map_err(|err| surface(environment, &context, err))
}

/// Unfollow `user_id` as `viewer_user_id`
///
/// # Errors
/// Returns the rejection or the typed error variant; the optimistic
/// removal is rolled back in both cases
pub async fn unfollow_user(
    environment: &Environment,
    user_id: &str,
    viewer_user_id: &str,
    follower_ids: &[String],
) -> ClientResult<()> {
    let followers: Vec<&str> = follower_ids
        .iter()
        .map(String::as_str)
        .filter(|id| *id != viewer_user_id)
        .collect();

    let context = context(&UNFOLLOW_USER, user_id, "Unable to unfollow this user");
    let data = commit(
        environment,
        &UNFOLLOW_USER,
        ("unfollowUser", "UnfollowUserPayload"),
        user_id,
        &followers,
        &context,
    )
    .await?;
    decode_payload::<UnfollowResult>(&data, "unfollowUser")
        .map_err(|err| surface(environment, &context, err))
}

fn context(descriptor: &OperationDescriptor, user_id: &str, toast: &str) -> ErrorContext {
    ErrorContext::new(descriptor.name)
        .with_tag("userId", user_id)
        .with_toast(ToastPolicy::Message(toast.to_string()))
}

async fn commit(
    environment: &Environment,
    descriptor: &OperationDescriptor,
    (field, typename): (&str, &str),
    user_id: &str,
    followers: &[&str],
    context: &ErrorContext,
) -> ClientResult<serde_json::Value> {
    let optimistic = OptimisticResponse::payload(field, typename).entity(
        "user",
        entity(USER_TYPENAME, user_id).with_list(
            "followers",
            followers.iter().map(|id| entity(USER_TYPENAME, id)),
        ),
    );
    let config = MutationConfig::new(*descriptor, json!({ "userId": user_id }))
        .with_optimistic_response(optimistic)
        .with_context(context.clone());
    Ok(environment.commit_mutation(config).await?)
}

/// Followers of `user_id` visible in `store`
#[must_use]
pub fn follower_count(store: &Store, user_id: &str) -> usize {
    store
        .lookup(&user_record(user_id))
        .map_or(0, |user| user.get_links("followers").len())
}
