//! Per-connection session lifecycle.
//!
//! # Responsibilities
//! - Wire one established connection to a fresh decoder and an egress subscription
//! - Drive inbound datagrams through the inbound router in arrival order
//! - Tear everything down exactly once when the connection closes
//!
//! # Design Decisions
//! - Teardown is latched; duplicate close signals and `Drop` are no-ops after the first
//! - Unsubscription reuses the exact topic key and listener handle from subscription

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::bus::{Bus, Listener, TopicKey};
use crate::codec::Codec;
use crate::config::TopicConfig;
use crate::gateway::inbound::InboundRouter;
use crate::gateway::outbound::{EgressGate, OutboundRouter};
use crate::net::peer::{ClientKey, PeerLabel};
use crate::net::transport::{ConnectionEvent, DatagramSender};
use crate::observability::{message_ids, metrics, LogFields, LogHooks};

/// Collaborators shared by every session of a gateway.
#[derive(Clone)]
pub struct SessionContext {
    pub bus: Arc<dyn Bus>,
    pub codec: Arc<dyn Codec>,
    pub log: LogHooks,
    pub topics: TopicConfig,
}

/// One established connection and the resources it owns.
pub struct Session {
    peer: SocketAddr,
    client_key: ClientKey,
    inbound: InboundRouter,
    bus: Arc<dyn Bus>,
    egress_topic: TopicKey,
    egress_listener: Listener,
    egress_gate: EgressGate,
    log: LogHooks,
    closed: bool,
}

impl Session {
    /// Create the session's decoder and subscribe its outbound router.
    pub fn open(peer: SocketAddr, sender: Arc<dyn DatagramSender>, ctx: &SessionContext) -> Self {
        let client_key = ClientKey::from_peer(&peer);

        let inbound = InboundRouter::new(
            client_key.clone(),
            ctx.topics.ingress.clone(),
            ctx.codec.parser(),
            Arc::clone(&ctx.bus),
            ctx.log.clone(),
        );

        let egress_topic = TopicKey::egress(&ctx.topics.egress, &client_key);
        let egress_gate = EgressGate::new();
        let egress_listener = OutboundRouter::new(
            client_key.clone(),
            Arc::clone(&ctx.codec),
            sender,
            egress_gate.clone(),
            ctx.log.clone(),
        )
        .into_listener();
        ctx.bus.on(egress_topic.clone(), Arc::clone(&egress_listener));

        metrics::record_session_opened();
        tracing::debug!(client_key = %client_key, topic = %egress_topic, "Session opened");

        Self {
            peer,
            client_key,
            inbound,
            bus: Arc::clone(&ctx.bus),
            egress_topic,
            egress_listener,
            egress_gate,
            log: ctx.log.clone(),
            closed: false,
        }
    }

    pub fn client_key(&self) -> &ClientKey {
        &self.client_key
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Feed one inbound datagram. Ignored once the session is closed.
    pub fn handle_message(&mut self, datagram: &[u8]) {
        if self.closed {
            return;
        }
        self.inbound.feed(datagram);
    }

    /// Release the egress subscription. Only the first call has any effect.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        // A bus may still hold a copy of the listener from an emit in progress.
        self.egress_gate.close();
        self.bus.remove_listener(&self.egress_topic, &self.egress_listener);
        metrics::record_session_closed();
        tracing::debug!(client_key = %self.client_key, "Session closed");

        self.log.debug(|| {
            (
                format!("Connection to {} closed", PeerLabel(&self.peer)),
                LogFields::new(message_ids::CONNECTION_CLOSED, &self.client_key),
            )
        });
    }

    /// Process connection events until close, end of stream or shutdown.
    pub async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(ConnectionEvent::Message(datagram)) => self.handle_message(&datagram),
                    Some(ConnectionEvent::Close) | None => break,
                },
                _ = shutdown.recv() => {
                    tracing::trace!(client_key = %self.client_key, "Session stopped by shutdown");
                    break;
                }
            }
        }
        self.close();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
