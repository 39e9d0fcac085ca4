//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, datagram sizes)
//! - Check that topic names cannot collide with the wildcard
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::bus::WILDCARD;
use crate::config::schema::GatewayConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const MIN_DATAGRAM_SIZE: usize = 2;
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("bind.address '{0}' is not an IP address")]
    BindAddress(String),

    #[error("transport.idle_timeout_secs must be greater than zero")]
    IdleTimeout,

    #[error("transport.max_sessions must be greater than zero")]
    MaxSessions,

    #[error("transport.max_datagram_size {0} is outside 2..=65535")]
    DatagramSize(usize),

    #[error("topics.{0} must not be empty")]
    EmptyTopic(&'static str),

    #[error("topics.{0} must not contain the wildcard '*'")]
    WildcardTopic(&'static str),

    #[error("topics.ingress and topics.egress must differ")]
    SameTopics,

    #[error("observability.log_level '{0}' is not one of trace, debug, info, warn, error")]
    LogLevel(String),

    #[error("observability.metrics_address '{0}' is not a socket address")]
    MetricsAddress(String),
}

/// Check every semantic rule, collecting all violations.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.bind.socket_addr().is_err() {
        errors.push(ValidationError::BindAddress(config.bind.address.clone()));
    }

    let transport = &config.transport;
    if transport.idle_timeout_secs == 0 {
        errors.push(ValidationError::IdleTimeout);
    }
    if transport.max_sessions == 0 {
        errors.push(ValidationError::MaxSessions);
    }
    if !(MIN_DATAGRAM_SIZE..=MAX_DATAGRAM_SIZE).contains(&transport.max_datagram_size) {
        errors.push(ValidationError::DatagramSize(transport.max_datagram_size));
    }

    for (name, topic) in [("ingress", &config.topics.ingress), ("egress", &config.topics.egress)] {
        if topic.is_empty() {
            errors.push(ValidationError::EmptyTopic(name));
        } else if topic.contains(WILDCARD) {
            errors.push(ValidationError::WildcardTopic(name));
        }
    }
    if config.topics.ingress == config.topics.egress {
        errors.push(ValidationError::SameTopics);
    }

    let level = config.observability.log_level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
