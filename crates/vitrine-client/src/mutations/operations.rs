//! Operation catalog
//!
//! Every operation the client sends. Names match the keys of the generated
//! persisted query map; the text is used when no persisted id is known.

use vitrine_mutation::OperationDescriptor;

/// Viewer, user and notification connections
pub const VIEWER_QUERY: OperationDescriptor = OperationDescriptor::query(
    "ViewerQuery",
    "query ViewerQuery { viewer { __typename ... on Viewer { id user { __typename id username \
     followers { __typename id } galleries { __typename id name } wallets { __typename id } } \
     notifications(last: 20) { unseenCount pageInfo { endCursor hasNextPage } \
     edges { cursor node { __typename id seen } } } } } }",
);

/// `followUser`
pub const FOLLOW_USER: OperationDescriptor = OperationDescriptor::mutation(
    "FollowUserMutation",
    "mutation FollowUserMutation($userId: DBID!) { followUser(userId: $userId) { __typename \
     ... on FollowUserPayload { user { __typename id followers { __typename id } } } \
     ... on Error { message } } }",
);

/// `unfollowUser`
pub const UNFOLLOW_USER: OperationDescriptor = OperationDescriptor::mutation(
    "UnfollowUserMutation",
    "mutation UnfollowUserMutation($userId: DBID!) { unfollowUser(userId: $userId) { __typename \
     ... on UnfollowUserPayload { user { __typename id followers { __typename id } } } \
     ... on Error { message } } }",
);

/// `clearAllNotifications`
pub const CLEAR_NOTIFICATIONS: OperationDescriptor = OperationDescriptor::mutation(
    "ClearNotificationsMutation",
    "mutation ClearNotificationsMutation { clearAllNotifications { __typename \
     ... on ClearAllNotificationsPayload { notifications { __typename id seen } } \
     ... on Error { message } } }",
);

/// `createGallery`
pub const CREATE_GALLERY: OperationDescriptor = OperationDescriptor::mutation(
    "CreateGalleryMutation",
    "mutation CreateGalleryMutation($input: CreateGalleryInput!) { createGallery(input: $input) { \
     __typename ... on CreateGalleryPayload { gallery { __typename id name description } } \
     ... on Error { message } } }",
);

/// `deleteGallery`
pub const DELETE_GALLERY: OperationDescriptor = OperationDescriptor::mutation(
    "DeleteGalleryMutation",
    "mutation DeleteGalleryMutation($galleryId: DBID!) { deleteGallery(galleryId: $galleryId) { \
     __typename ... on DeleteGalleryPayload { deletedId { dbid } } ... on Error { message } } }",
);

/// `updateGalleryInfo`
pub const UPDATE_GALLERY_INFO: OperationDescriptor = OperationDescriptor::mutation(
    "UpdateGalleryInfoMutation",
    "mutation UpdateGalleryInfoMutation($input: UpdateGalleryInfoInput!) { \
     updateGalleryInfo(input: $input) { __typename ... on UpdateGalleryInfoPayload { \
     gallery { __typename id name description } } ... on Error { message } } }",
);

/// `removeUserWallets`
pub const REMOVE_WALLET: OperationDescriptor = OperationDescriptor::mutation(
    "RemoveWalletMutation",
    "mutation RemoveWalletMutation($walletIds: [DBID!]!) { removeUserWallets(walletIds: $walletIds) { \
     __typename ... on RemoveUserWalletsPayload { viewer { __typename id } } \
     ... on Error { message } } }",
);

/// `setSpamPreference`
pub const SET_SPAM_PREFERENCE: OperationDescriptor = OperationDescriptor::mutation(
    "SetSpamPreferenceMutation",
    "mutation SetSpamPreferenceMutation($tokens: [DBID!]!, $isSpam: Boolean!) { \
     setSpamPreference(input: { tokens: $tokens, isSpam: $isSpam }) { __typename \
     ... on SetSpamPreferencePayload { tokens { __typename id isSpamByUser } } \
     ... on Error { message } } }",
);

/// `syncTokens`
pub const SYNC_TOKENS: OperationDescriptor = OperationDescriptor::mutation(
    "SyncTokensMutation",
    "mutation SyncTokensMutation($chains: [Chain!]) { syncTokens(chains: $chains) { __typename \
     ... on SyncTokensPayload { viewer { __typename id } } ... on Error { message } } }",
);

/// New notification for the viewer
pub const NEW_NOTIFICATION: OperationDescriptor = OperationDescriptor::subscription(
    "NewNotificationSubscription",
    "subscription NewNotificationSubscription { newNotification { __typename id seen } }",
);

/// Existing notification changed
pub const NOTIFICATION_UPDATED: OperationDescriptor = OperationDescriptor::subscription(
    "NotificationUpdatedSubscription",
    "subscription NotificationUpdatedSubscription { notificationUpdated { __typename id seen } }",
);

/// Every operation, for persisted map checks
pub const ALL: &[OperationDescriptor] = &[
    VIEWER_QUERY,
    FOLLOW_USER,
    UNFOLLOW_USER,
    CLEAR_NOTIFICATIONS,
    CREATE_GALLERY,
    DELETE_GALLERY,
    UPDATE_GALLERY_INFO,
    REMOVE_WALLET,
    SET_SPAM_PREFERENCE,
    SYNC_TOKENS,
    NEW_NOTIFICATION,
    NOTIFICATION_UPDATED,
];

/// Descriptor by operation name
#[must_use]
pub fn by_name(name: &str) -> Option<&'static OperationDescriptor> {
    ALL.iter().find(|descriptor| descriptor.name == name)
}
