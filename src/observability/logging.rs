//! Structured logging.
//!
//! # Responsibilities
//! - Define the injectable log hooks the gateway reports through
//! - Carry stable message ids for every diagnostic record
//! - Bridge hooks into `tracing` for the binary
//! - Initialize the tracing subscriber
//!
//! # Design Decisions
//! - Hooks are optional per level; an absent hook short-circuits before the
//!   message is even formatted
//! - Fields are a JSON object so packet contents can be attached verbatim

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::codec::packet::{Packet, CLIENT_KEY_FIELD};
use crate::config::LogConfig;
use crate::net::peer::ClientKey;

/// Stable ids identifying each diagnostic record.
pub mod message_ids {
    pub const HANDSHAKE_STARTED: &str = "c266859e94db40edbf126f74634dd5fc";
    pub const PEER_ERROR: &str = "c62a326b9eae447c862d139a5972f92c";
    pub const HANDSHAKE_FINISHED: &str = "1d223f68a881407d86b94babf40da157";
    pub const CONNECTION_CLOSED: &str = "0664446f18574088b369460de3aa197b";
    pub const PARSER_ERROR: &str = "fed465ee771a4701ad119f1fda70972a";
    pub const UNCONSUMED_PACKET: &str = "9cf60d7aa0eb4b3f976f25671eea1ff5";
    pub const GENERATOR_ERROR: &str = "c05700ab021d47ddbd3ab914e2eef334";
}

/// Structured fields attached to a log record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LogFields(Map<String, Value>);

impl LogFields {
    /// Start a record with its message id and the peer it concerns.
    pub fn new(message_id: &str, client_key: &ClientKey) -> Self {
        let mut fields = Map::new();
        fields.insert("message_id".to_string(), Value::from(message_id));
        fields.insert(CLIENT_KEY_FIELD.to_string(), Value::from(client_key.as_str()));
        Self(fields)
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    /// Copy every packet field in without overriding the record's own fields.
    pub fn with_packet(mut self, packet: &Packet) -> Self {
        for (name, value) in packet.to_fields() {
            self.0.entry(name).or_insert(value);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn message_id(&self) -> &str {
        self.get("message_id").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn client_key(&self) -> &str {
        self.get(CLIENT_KEY_FIELD).and_then(Value::as_str).unwrap_or_default()
    }

}

impl fmt::Display for LogFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(json) => f.write_str(&json),
            Err(_) => f.write_str("{}"),
        }
    }
}

/// A log hook: `(message, fields)`.
pub type LogFn = Arc<dyn Fn(&str, &LogFields) + Send + Sync>;

/// Optional logging callbacks, one per level.
#[derive(Clone, Default)]
pub struct LogHooks {
    pub debug: Option<LogFn>,
    pub warn: Option<LogFn>,
    pub error: Option<LogFn>,
}

impl LogHooks {
    /// No hooks at all.
    pub fn none() -> Self {
        Self::default()
    }

    /// Hooks forwarding into `tracing`, enabled per level by `config`.
    pub fn tracing(config: &LogConfig) -> Self {
        let debug: LogFn = Arc::new(|message: &str, fields: &LogFields| {
            tracing::debug!(
                message_id = fields.message_id(),
                client_key = fields.client_key(),
                fields = %fields,
                "{}",
                message
            );
        });
        let warn: LogFn = Arc::new(|message: &str, fields: &LogFields| {
            tracing::warn!(
                message_id = fields.message_id(),
                client_key = fields.client_key(),
                fields = %fields,
                "{}",
                message
            );
        });
        let error: LogFn = Arc::new(|message: &str, fields: &LogFields| {
            tracing::error!(
                message_id = fields.message_id(),
                client_key = fields.client_key(),
                fields = %fields,
                "{}",
                message
            );
        });

        Self {
            debug: config.debug.then_some(debug),
            warn: config.warn.then_some(warn),
            error: config.error.then_some(error),
        }
    }

    pub fn debug(&self, record: impl FnOnce() -> (String, LogFields)) {
        emit(self.debug.as_ref(), record);
    }

    pub fn warn(&self, record: impl FnOnce() -> (String, LogFields)) {
        emit(self.warn.as_ref(), record);
    }

    pub fn error(&self, record: impl FnOnce() -> (String, LogFields)) {
        emit(self.error.as_ref(), record);
    }
}

fn emit(hook: Option<&LogFn>, record: impl FnOnce() -> (String, LogFields)) {
    if let Some(hook) = hook {
        let (message, fields) = record();
        hook(&message, &fields);
    }
}

impl fmt::Debug for LogHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogHooks")
            .field("debug", &self.debug.is_some())
            .field("warn", &self.warn.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("mqttsn_dtls_gateway={}", default_level))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
