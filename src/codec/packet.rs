//! Application packet model shared by codecs and the bus.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::net::peer::ClientKey;

/// Field name the peer key is published under.
pub const CLIENT_KEY_FIELD: &str = "clientKey";

/// A decoded application packet.
///
/// Only `cmd` and `client_key` carry meaning for routing; everything else is
/// kept as an open field map owned by the codec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    /// Command discriminator, e.g. `publish`.
    #[serde(default)]
    pub cmd: String,

    /// Set by the gateway on ingress.
    #[serde(rename = "clientKey", default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<ClientKey>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Packet {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            client_key: None,
            fields: Map::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Flattened view of every field, including `cmd` and `client_key`.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut all = self.fields.clone();
        if !self.cmd.is_empty() {
            all.insert("cmd".to_string(), Value::String(self.cmd.clone()));
        }
        if let Some(key) = &self.client_key {
            all.insert(CLIENT_KEY_FIELD.to_string(), Value::String(key.to_string()));
        }
        all
    }
}
