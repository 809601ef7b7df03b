//! Vitrine Client - gallery data layer
//!
//! Wires the optimistic store and mutation invoker to the outside world:
//! - [`HttpNetwork`] posts GraphQL requests with `reqwest`
//! - [`SubscriptionChannel`] multiplexes live subscriptions over one socket
//!   per endpoint; [`WsConnector`] opens that socket
//! - [`Preferences`] keeps device flags in [`LocalStorage`]
//! - [`mutations`] holds the gallery mutation hooks
//! - [`ViewerSession`] carries the signed-in viewer's context explicitly
//!
//! # Example
//!
//! ```rust,ignore
//! use vitrine_client::prelude::*;
//!
//! let config = ClientConfig::load("vitrine.toml")?;
//! let environment = environment_from_config(&config)?;
//! let session = ViewerSession::load(environment, preferences_from_config(&config)).await?;
//! session.follow("u1", &[]).await?;
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod http;
pub mod mutations;
pub mod session;
pub mod simulator;
pub mod storage;
pub mod subscription;
pub mod ws;

pub use config::{ClientConfig, Deployment};
pub use error::{
    ClientError, ClientResult, ConfigError, StorageError, SubscriptionError, ValidationError,
};
pub use http::HttpNetwork;
pub use session::{
    environment_from_config, preferences_from_config, subscriptions_from_config, ViewerSession,
};
pub use storage::{FileStorage, LocalStorage, MemoryStorage, OnboardingProgress, Preferences};
pub use subscription::{
    Connector, FrameSink, FrameStream, SubscriptionChannel, SubscriptionHandler, SubscriptionPool,
    SubscriptionRegistry, SubscriptionStream, WsMessage,
};
pub use ws::{WsConnector, GRAPHQL_TRANSPORT_WS};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for client call sites
    pub use crate::mutations::Chain;
    pub use crate::{
        environment_from_config, preferences_from_config, subscriptions_from_config, ClientConfig,
        ClientError, ClientResult, Deployment, Preferences, SubscriptionPool, ValidationError,
        ViewerSession,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
