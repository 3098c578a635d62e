//! Transport configuration parsing and validation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{LinkError, Result};

/// Transport configuration parsed from `config.toml`.
///
/// Immutable after construction; the client and the agent each hold their
/// own clone for their lifetime.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Namespaced local-socket name both sides resolve the endpoint from.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Total budget for connection establishment, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Pause between connection attempts, in milliseconds.
    #[serde(default = "default_connect_retry_delay_ms")]
    pub connect_retry_delay_ms: u64,
    /// Number of analysis worker threads on the agent side.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

fn default_endpoint() -> String {
    "scanlink".into()
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_connect_retry_delay_ms() -> u64 {
    100
}

fn default_worker_threads() -> usize {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            connect_timeout_ms: default_connect_timeout_ms(),
            connect_retry_delay_ms: default_connect_retry_delay_ms(),
            worker_threads: default_worker_threads(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| LinkError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `LinkError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Total connection budget as a `Duration`.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Pause between connection attempts as a `Duration`.
    #[must_use]
    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(LinkError::Config("endpoint must not be empty".into()));
        }

        if self.connect_timeout_ms == 0 {
            return Err(LinkError::Config(
                "connect_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.connect_retry_delay_ms == 0 {
            return Err(LinkError::Config(
                "connect_retry_delay_ms must be greater than zero".into(),
            ));
        }

        if self.worker_threads == 0 {
            return Err(LinkError::Config(
                "worker_threads must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
