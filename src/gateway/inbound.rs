//! Inbound routing: peer bytes → bus events.
//!
//! # Responsibilities
//! - Feed datagrams to the session's decoder in arrival order
//! - Stamp each decoded packet with the peer's key and publish it
//! - Report unconsumed packets and decode failures through the log hooks

use std::sync::Arc;

use crate::bus::{Bus, TopicKey};
use crate::codec::{CodecError, Decoder, Packet};
use crate::net::peer::ClientKey;
use crate::observability::{message_ids, metrics, LogFields, LogHooks};

/// Routes one session's inbound traffic onto the bus.
pub struct InboundRouter {
    client_key: ClientKey,
    direction: String,
    decoder: Box<dyn Decoder>,
    bus: Arc<dyn Bus>,
    log: LogHooks,
}

impl InboundRouter {
    pub fn new(
        client_key: ClientKey,
        direction: impl Into<String>,
        decoder: Box<dyn Decoder>,
        bus: Arc<dyn Bus>,
        log: LogHooks,
    ) -> Self {
        Self {
            client_key,
            direction: direction.into(),
            decoder,
            bus,
            log,
        }
    }

    /// Feed one datagram. Every packet it completes is published before this returns.
    pub fn feed(&mut self, datagram: &[u8]) {
        for decoded in self.decoder.parse(datagram) {
            match decoded {
                Ok(packet) => {
                    self.publish(packet);
                }
                Err(e) => self.decode_failed(&e),
            }
        }
    }

    /// Publish a decoded packet on `[ingress, key, cmd]`. Returns whether it was consumed.
    pub fn publish(&self, mut packet: Packet) -> bool {
        packet.client_key = Some(self.client_key.clone());
        let topic = TopicKey::ingress(&self.direction, &self.client_key, &packet.cmd);

        let consumed = self.bus.emit(&topic, &packet);
        metrics::record_ingress(&packet.cmd, consumed);

        if !consumed {
            self.log.error(|| {
                (
                    "Unconsumed MQTTSN packet".to_string(),
                    LogFields::new(message_ids::UNCONSUMED_PACKET, &self.client_key).with_packet(&packet),
                )
            });
        }
        consumed
    }

    fn decode_failed(&self, error: &CodecError) {
        metrics::record_decode_error();
        self.log.warn(|| {
            (
                format!("Parser error: {}", error),
                LogFields::new(message_ids::PARSER_ERROR, &self.client_key)
                    .with("stack", format!("{:?}", error)),
            )
        });
    }
}
