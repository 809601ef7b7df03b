//! Client configuration
//!
//! Loaded from a TOML file; every field has a default so an empty file (or
//! no file) is a valid production configuration.
//!
//! ```toml
//! environment = "development"
//! persisted_queries = "persisted_queries.json"
//! request_timeout_ms = 15000
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use vitrine_mutation::EnvironmentConfig;

/// Backend deployment the client talks to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Deployment {
    /// Live service
    #[default]
    Production,
    /// Shared development service
    Development,
    /// Backend on this machine
    Local,
}

impl Deployment {
    /// GraphQL HTTP endpoint
    #[must_use]
    pub fn graphql_url(self) -> &'static str {
        match self {
            Self::Production => "https://api.gallery.so/glry/graphql/query",
            Self::Development => "https://api.dev.gallery.so/glry/graphql/query",
            Self::Local => "http://localhost:4000/glry/graphql/query",
        }
    }

    /// Subscription socket endpoint
    #[must_use]
    pub fn subscription_url(self) -> &'static str {
        match self {
            Self::Production => "wss://api.gallery.so/glry/graphql/query",
            Self::Development => "wss://api.dev.gallery.so/glry/graphql/query",
            Self::Local => "ws://localhost:4000/glry/graphql/query",
        }
    }
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Production => "production",
            Self::Development => "development",
            Self::Local => "local",
        };
        f.write_str(name)
    }
}

impl FromStr for Deployment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            "local" => Ok(Self::Local),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Deployment
    pub environment: Deployment,
    /// GraphQL URL override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graphql_url: Option<String>,
    /// Subscription URL override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_url: Option<String>,
    /// Generated persisted query map
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persisted_queries: Option<PathBuf>,
    /// Directory for device storage
    pub storage_dir: PathBuf,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Toast display time in milliseconds
    pub toast_duration_ms: u64,
    /// Reject operations missing from the persisted map
    pub strict_persisted: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            environment: Deployment::default(),
            graphql_url: None,
            subscription_url: None,
            persisted_queries: None,
            storage_dir: PathBuf::from(".vitrine"),
            request_timeout_ms: 30_000,
            toast_duration_ms: 4_000,
            strict_persisted: false,
        }
    }
}

impl ClientConfig {
    /// Create default config
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// Returns error if the text is not a valid config
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Render as TOML
    ///
    /// # Errors
    /// Returns error if rendering fails
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// With deployment
    #[must_use]
    pub fn with_environment(mut self, environment: Deployment) -> Self {
        self.environment = environment;
        self
    }

    /// With GraphQL URL override
    #[must_use]
    pub fn with_graphql_url(mut self, url: impl Into<String>) -> Self {
        self.graphql_url = Some(url.into());
        self
    }

    /// With subscription URL override
    #[must_use]
    pub fn with_subscription_url(mut self, url: impl Into<String>) -> Self {
        self.subscription_url = Some(url.into());
        self
    }

    /// With persisted query map path
    #[must_use]
    pub fn with_persisted_queries(mut self, path: impl Into<PathBuf>) -> Self {
        self.persisted_queries = Some(path.into());
        self
    }

    /// With storage directory
    #[must_use]
    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }

    /// With request timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With strict persisted mode
    #[must_use]
    pub fn with_strict_persisted(mut self, strict: bool) -> Self {
        self.strict_persisted = strict;
        self
    }

    /// Effective GraphQL URL
    #[must_use]
    pub fn graphql_url(&self) -> &str {
        self.graphql_url
            .as_deref()
            .unwrap_or_else(|| self.environment.graphql_url())
    }

    /// Effective subscription URL
    #[must_use]
    pub fn subscription_url(&self) -> &str {
        self.subscription_url
            .as_deref()
            .unwrap_or_else(|| self.environment.subscription_url())
    }

    /// Request timeout
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Toast display time
    #[inline]
    #[must_use]
    pub fn toast_duration(&self) -> Duration {
        Duration::from_millis(self.toast_duration_ms)
    }

    /// Invoker settings
    #[must_use]
    pub fn environment_config(&self) -> EnvironmentConfig {
        EnvironmentConfig::new()
            .with_request_timeout(self.request_timeout())
            .with_strict_persisted(self.strict_persisted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn empty_file_is_production() {
        let config = ClientConfig::from_toml("").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.graphql_url(), Deployment::Production.graphql_url());
    }

    #[test]
    fn urls_follow_environment_unless_overridden() {
        let config = ClientConfig::from_toml(
            r#"
            environment = "development"
            subscription_url = "ws://127.0.0.1:9000/ws"
            "#,
        )
        .unwrap();
        assert_eq!(config.graphql_url(), Deployment::Development.graphql_url());
        assert_eq!(config.subscription_url(), "ws://127.0.0.1:9000/ws");
    }

    #[test]
    fn toml_roundtrip_keeps_overrides() {
        let config = ClientConfig::new()
            .with_environment(Deployment::Local)
            .with_persisted_queries("map.json")
            .with_request_timeout(Duration::from_secs(5));
        let parsed = ClientConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.environment_config().request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "environment = \"local\"\nstrict_persisted = true").unwrap();
        let config = ClientConfig::load(file.path()).unwrap();
        assert_eq!(config.environment, Deployment::Local);
        assert!(config.strict_persisted);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            ClientConfig::from_toml("environment = \"staging\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ClientConfig::load("/no/such/config.toml"),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn deployment_from_str() {
        assert_eq!("dev".parse::<Deployment>().unwrap(), Deployment::Development);
        assert!("staging".parse::<Deployment>().is_err());
    }
}
