//! Vitrine Mutation - optimistic mutation invoker
//!
//! Wraps a callback-style GraphQL [`Network`] into awaitable calls that keep
//! the [`Store`](vitrine_store::Store) consistent:
//! - [`Environment::commit_mutation`] applies the optimistic layer, sends one
//!   request and settles exactly once
//! - [`OptimisticResponse`] builds the provisional payload
//! - [`decode_payload`] discriminates typed error variants
//! - [`ErrorRouter`] forwards rejections to reporting and toasts
//! - [`SyncTokensLock`] keeps token syncs from overlapping
//!
//! # Example
//!
//! ```rust,ignore
//! use vitrine_mutation::prelude::*;
//!
//! let config = MutationConfig::new(FOLLOW_USER, json!({ "userId": "u1" }))
//!     .with_optimistic_response(optimistic)
//!     .with_updater(updater);
//! let data = environment.commit_mutation(config).await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod environment;
pub mod error;
pub mod lock;
pub mod network;
pub mod operation;
pub mod optimistic;
pub mod payload;
pub mod routing;
pub mod state;

pub use environment::{Environment, EnvironmentConfig, MutationConfig, DEFAULT_REQUEST_TIMEOUT};
pub use error::{
    DomainError, LockError, MutationError, MutationResult, NetworkError, PersistedMapError,
    StateError,
};
pub use lock::{SyncTokensGuard, SyncTokensLock};
pub use network::{Completion, GraphQlError, GraphQlRequest, GraphQlResponse, Network, Observer};
pub use operation::{OperationDescriptor, OperationKind, PersistedQueryMap};
pub use optimistic::{entity, Entity, OptimisticResponse};
pub use payload::{decode_payload, on_success, ErrorMessage, PayloadVariant};
pub use routing::{
    ErrorContext, ErrorReporter, ErrorRouter, Rejection, Toast, ToastKind, ToastPolicy, ToastSink,
    TracingReporter, TracingToasts, DEFAULT_TOAST_DURATION,
};
pub use state::{MutationState, MutationTracker};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for mutation call sites
    pub use crate::{
        decode_payload, entity, Environment, ErrorContext, MutationConfig, MutationError,
        OperationDescriptor, OptimisticResponse, PayloadVariant, ToastPolicy,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
