//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the secure
//! listener server. All types derive Serde traits for deserialization from
//! config files.

use serde::{Deserialize, Serialize};

use crate::net::listener::BindPolicy;
use crate::security::CredentialConfig;
use crate::transport::ChannelConfig;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SecurePortConfig {
    /// Server-wide settings shared by every listener.
    pub server: ServerConfig,

    /// Channel configuration handed to every constructed transport.
    pub channel: ChannelConfig,

    /// Secure listeners to register at startup.
    pub listeners: Vec<ListenerConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Server-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Maximum time a single handshake may take, in seconds.
    pub handshake_timeout_secs: u64,

    /// Handshakes allowed in flight per port before new connections are shed.
    pub max_pending_handshakes: usize,

    /// On shutdown, how long a destroyed port waits for its in-flight
    /// handshakes to settle. Zero skips the wait.
    pub drain_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: 10,
            max_pending_handshakes: 1024,
            drain_timeout_secs: 5,
        }
    }
}

/// One secure listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenerConfig {
    /// Listen address (e.g., "0.0.0.0:8443", "localhost:0", "[::]:443").
    pub address: String,

    /// Credential securing this listener.
    #[serde(default)]
    pub credential: Option<CredentialConfig>,

    /// What to do when only part of the resolved address set binds.
    #[serde(default)]
    pub bind_policy: BindPolicy,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log format for the fmt layer.
    pub log_format: LogFormat,

    /// Default filter directive when `RUST_LOG` is not set.
    pub log_filter: String,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Address for the Prometheus scrape endpoint.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            log_filter: "secure_port=info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
