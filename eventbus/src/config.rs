//! Client identity and start position.

use std::env;

use thiserror::Error;

/// Environment variables read by [`ClientConfig::from_env`].
pub const ENV_ENDPOINT: &str = "EVENTBUS_ENDPOINT";
pub const ENV_TOKEN: &str = "EVENTBUS_TOKEN";
pub const ENV_STREAM: &str = "EVENTBUS_STREAM";
pub const ENV_CLIENT: &str = "EVENTBUS_CLIENT";
pub const ENV_VERSION: &str = "EVENTBUS_VERSION";

/// Default protocol version announced in the handshake.
pub const DEFAULT_VERSION: &str = "1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
}

/// Identifies the client to the stream server. Fixed for the client's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoint: String,
    pub auth_token: String,
    pub stream: String,
    pub client: String,
    pub version: String,
}

impl ClientConfig {
    pub fn new(
        endpoint: impl Into<String>,
        auth_token: impl Into<String>,
        stream: impl Into<String>,
        client: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth_token: auth_token.into(),
            stream: stream.into(),
            client: client.into(),
            version: DEFAULT_VERSION.to_string(),
        }
    }

    /// Set the protocol version.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Read the config from `EVENTBUS_*` variables. `EVENTBUS_VERSION` is
    /// optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));
        let config = Self::new(
            required(ENV_ENDPOINT)?,
            required(ENV_TOKEN)?,
            required(ENV_STREAM)?,
            required(ENV_CLIENT)?,
        );
        Ok(match lookup(ENV_VERSION) {
            Some(version) => config.with_version(version),
            None => config,
        })
    }
}

/// Where to begin when no checkpoint exists yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartPosition {
    /// Earliest retained message of every partition.
    #[default]
    Oldest,
    /// Only messages produced after the handshake.
    Newest,
}

impl StartPosition {
    /// Offset sentinel the server understands for this boundary.
    pub fn sentinel(self) -> i64 {
        match self {
            Self::Newest => -1,
            Self::Oldest => -2,
        }
    }
}
