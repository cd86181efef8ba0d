//! Endpoint configuration.

use crate::error::ConfigError;
use interop_core::{PROTOCOL_VERSION, Version};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Runtime settings of one endpoint.
///
/// Every field has a default, so an empty TOML document is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// How long to wait for the reply to a request.
    pub response_timeout_ms: u64,
    /// Period of the keep-alive verification round.
    pub keep_alive_interval_ms: u64,
    /// Consecutive failed verifications after which a remote is dropped.
    pub max_missed_verifications: u32,
    /// Version announced in the handshake.
    pub protocol_version: Version,
    /// Other remote versions accepted in the handshake.
    pub supported_versions: Vec<Version>,
    pub discovery_address: String,
    pub message_address: String,
    pub data_address: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 30_000,
            keep_alive_interval_ms: 10_000,
            max_missed_verifications: 1,
            protocol_version: PROTOCOL_VERSION,
            supported_versions: Vec::new(),
            discovery_address: String::new(),
            message_address: String::new(),
            data_address: String::new(),
        }
    }
}

impl EndpointConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }

    /// Whether a remote announcing `version` may connect.
    pub fn accepts(&self, version: &Version) -> bool {
        *version == self.protocol_version || self.supported_versions.contains(version)
    }
}
