//! Client configuration.
//!
//! Every field has a default, so a TOML file only needs to name what it
//! changes:
//!
//! ```toml
//! endpoint = "tcp://127.0.0.1:7824"
//! application = "clearline"
//! request_timeout_ms = 5000
//!
//! [reconnect]
//! max_attempts = 3
//! ```

use std::{path::Path, time::Duration};

use clearline_core::{ConnectionConfig, ReconnectPolicy};
use clearline_proto::{Amount, payloads::Allowance};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path that was read
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// File is not valid TOML for [`ClientConfig`]
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Reconnect backoff settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Growth factor per retry
    pub multiplier: u32,
    /// Upper bound on a single delay
    pub max_delay_ms: u64,
    /// Retries before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self { base_delay_ms: 1_000, multiplier: 2, max_delay_ms: 30_000, max_attempts: 5 }
    }
}

impl ReconnectConfig {
    /// Backoff policy for the connection state machine.
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base: Duration::from_millis(self.base_delay_ms),
            multiplier: self.multiplier,
            cap: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
        }
    }
}

/// Per-client configuration, injected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Clearing node endpoint handed to the transport
    pub endpoint: String,
    /// Application name the session key is scoped to
    pub application: String,
    /// Permission scope requested for the session key
    pub scope: String,
    /// Domain name bound into auth signatures
    pub auth_domain: String,
    /// Chain the channels settle on
    pub chain_id: u64,
    /// Asset used for channels and transfers
    pub asset: String,
    /// Spending ceilings granted to the session key
    pub allowances: Vec<Allowance>,
    /// Session key lifetime in seconds
    pub session_duration_secs: u64,
    /// Budget for opening the transport
    pub connection_timeout_ms: u64,
    /// Budget for each round trip
    pub request_timeout_ms: u64,
    /// Ping interval while authenticated
    pub keepalive_interval_ms: u64,
    /// Reconnect backoff
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "tcp://127.0.0.1:7824".into(),
            application: "clearline".into(),
            scope: "console".into(),
            auth_domain: "Clearline".into(),
            chain_id: 1,
            asset: "usdc".into(),
            allowances: vec![Allowance {
                asset: "usdc".into(),
                amount: Amount::new(1_000_000_000),
            }],
            session_duration_secs: 3_600,
            connection_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
            keepalive_interval_ms: 30_000,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        Self::from_toml_str(&text)
    }

    /// Transport open budget.
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Round-trip budget.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Session key lifetime.
    pub fn session_duration(&self) -> Duration {
        Duration::from_secs(self.session_duration_secs)
    }

    /// Settings for the connection state machine.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            keepalive_interval: Duration::from_millis(self.keepalive_interval_ms),
            reconnect: self.reconnect.policy(),
        }
    }
}
