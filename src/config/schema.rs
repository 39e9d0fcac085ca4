//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{AddrParseError, IpAddr, SocketAddr};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Where the transport listens.
    pub bind: BindConfig,

    /// Transport provider limits.
    pub transport: TransportConfig,

    /// Bus topic names.
    pub topics: TopicConfig,

    /// Which gateway log levels are forwarded.
    pub log: LogConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Transport bind parameters.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct BindConfig {
    /// IP address to bind (e.g., "0.0.0.0" or "::").
    pub address: String,

    /// UDP port; 0 picks an ephemeral port.
    pub port: u16,
}

impl BindConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        let ip: IpAddr = self.address.parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Default for BindConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 1884,
        }
    }
}

impl fmt::Display for BindConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]:{}", self.address, self.port)
    }
}

/// Transport provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransportConfig {
    /// Seconds without traffic before a peer is closed.
    pub idle_timeout_secs: u64,

    /// Maximum concurrent sessions (backpressure).
    pub max_sessions: usize,

    /// Receive buffer size; larger datagrams are truncated by the OS.
    pub max_datagram_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 300,
            max_sessions: 10_000,
            max_datagram_size: 1500,
        }
    }
}

/// Names of the bus topic directions.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TopicConfig {
    /// Direction segment for packets received from peers.
    pub ingress: String,

    /// Direction segment for packets addressed to peers.
    pub egress: String,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            ingress: "snUnicastIngress".to_string(),
            egress: "snUnicastOutgress".to_string(),
        }
    }
}

/// Per-level switches for the gateway's diagnostic records.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    pub debug: bool,
    pub warn: bool,
    pub error: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: true,
            warn: true,
            error: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
