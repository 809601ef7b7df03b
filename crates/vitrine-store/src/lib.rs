//! Vitrine Store - normalized client cache
//!
//! Holds every entity the client has fetched as a flat map of records keyed
//! by [`DataId`], plus paginated [`Connection`]s keyed by [`ConnectionKey`].
//!
//! - [`normalize`] turns a response payload into a [`RecordSource`]
//! - [`Store`] keeps the confirmed layer and an optimistic overlay
//! - [`StoreProxy`] and [`ConnectionHandler`] are what updaters write through
//!
//! # Example
//!
//! ```rust,ignore
//! use vitrine_store::prelude::*;
//!
//! let store = Store::new();
//! let id = MutationId::new();
//! store.apply_optimistic(PendingUpdate::new(id).with_updater(updater))?;
//! // ... the server rejects the mutation
//! store.rollback(id);
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod connection;
pub mod data_id;
pub mod error;
pub mod normalize;
pub mod proxy;
pub mod record;
pub mod source;
pub mod store;

pub use connection::{Connection, ConnectionHandler, Edge, PageInfo, PageMerge};
pub use data_id::{Arguments, ConnectionKey, DataId, ROOT_ID, ROOT_TYPENAME};
pub use error::{NormalizeError, StoreError, StoreResult};
pub use normalize::{normalize, NormalizeOptions};
pub use proxy::StoreProxy;
pub use record::{FieldValue, Record};
pub use source::{RecordSource, RecordState};
pub use store::{MutationId, OptimisticPayload, PendingUpdate, Store, Updater};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the store
    pub use crate::{
        ConnectionHandler, ConnectionKey, DataId, MutationId, NormalizeOptions,
        OptimisticPayload, PendingUpdate, Store, StoreProxy, Updater,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
