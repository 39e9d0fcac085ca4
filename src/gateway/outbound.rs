//! Outbound routing: bus events → peer bytes.
//!
//! # Responsibilities
//! - Encode packets published for one peer
//! - Transmit each encoded packet exactly once
//! - Drop packets that fail to encode, leaving the connection untouched
//! - Stay silent once the owning session has closed, even for emits already in flight

use std::sync::{Arc, PoisonError, RwLock};

use crate::bus::Listener;
use crate::codec::{Codec, Packet};
use crate::net::peer::ClientKey;
use crate::net::transport::DatagramSender;
use crate::observability::{message_ids, metrics, LogFields, LogHooks};

/// Closed flag shared by a session and its outbound router.
///
/// Deliveries hold the read side while they encode and send, so once
/// [`close`](Self::close) returns no delivery is running and none will start.
#[derive(Debug, Clone, Default)]
pub struct EgressGate {
    closed: Arc<RwLock<bool>>,
}

impl EgressGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for in-flight deliveries, then refuses new ones.
    pub fn close(&self) {
        *self.closed.write().unwrap_or_else(PoisonError::into_inner) = true;
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handles packets addressed to one peer.
pub struct OutboundRouter {
    client_key: ClientKey,
    codec: Arc<dyn Codec>,
    sender: Arc<dyn DatagramSender>,
    gate: EgressGate,
    log: LogHooks,
}

impl OutboundRouter {
    pub fn new(
        client_key: ClientKey,
        codec: Arc<dyn Codec>,
        sender: Arc<dyn DatagramSender>,
        gate: EgressGate,
        log: LogHooks,
    ) -> Self {
        Self {
            client_key,
            codec,
            sender,
            gate,
            log,
        }
    }

    pub fn handle(&self, packet: &Packet) {
        let closed = self.gate.closed.read().unwrap_or_else(PoisonError::into_inner);
        if *closed {
            tracing::trace!(client_key = %self.client_key, cmd = %packet.cmd, "Session closed, packet dropped");
            return;
        }

        let datagram = match self.codec.generate(packet) {
            Ok(datagram) => datagram,
            Err(e) => {
                metrics::record_egress("encode_error");
                self.log.error(|| {
                    (
                        format!("Generator error: {}", e),
                        LogFields::new(message_ids::GENERATOR_ERROR, &self.client_key)
                            .with("stack", format!("{:?}", e))
                            .with_packet(packet),
                    )
                });
                return;
            }
        };

        match self.sender.send(datagram) {
            Ok(()) => metrics::record_egress("sent"),
            Err(e) => {
                metrics::record_egress("send_error");
                tracing::warn!(client_key = %self.client_key, error = %e, "Failed to transmit packet");
            }
        }
    }

    /// Wrap into a bus listener. The returned handle is also the unsubscribe key.
    pub fn into_listener(self) -> Listener {
        Arc::new(move |packet: &Packet| self.handle(packet))
    }
}
