//! Secure datagram transport contract.
//!
//! # Responsibilities
//! - Create a server instance that reports connection lifecycle events
//! - Bind and close the server on request
//! - Hand established connections over as a send primitive plus an event stream
//!
//! # Design Decisions
//! - Events travel over unbounded tokio channels; the gateway owns the receivers
//! - Sending is synchronous and non-blocking so it can run inside bus listeners
//! - The end of a connection's event channel counts as a close signal

use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::BindConfig;

/// Errors reported by a transport provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The server could not be created.
    #[error("failed to create server: {0}")]
    Create(String),

    /// Binding the server socket failed.
    #[error("failed to bind {address}: {reason}")]
    Bind { address: String, reason: String },

    /// Handshake with a peer failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The peer was refused a session.
    #[error("session refused: {0}")]
    Refused(String),

    /// A datagram could not be sent.
    #[error("send failed: {0}")]
    Send(String),

    /// A datagram exceeded the configured size limit and was dropped.
    #[error("datagram exceeds {limit} bytes")]
    Oversized { limit: usize },
}

/// Events emitted by a server.
#[derive(Debug)]
pub enum ServerEvent {
    /// A peer started a handshake. No session exists yet.
    Connection { peer: SocketAddr },
    /// A failure attributable to a peer.
    Error { peer: SocketAddr, error: TransportError },
    /// The handshake finished and the connection is ready for traffic.
    SecureConnection(Connection),
}

pub type ServerEventSender = mpsc::UnboundedSender<ServerEvent>;
pub type ServerEventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

/// Events emitted by a single connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// One decrypted datagram from the peer.
    Message(Bytes),
    /// The connection is gone.
    Close,
}

/// Non-blocking send primitive of a connection.
pub trait DatagramSender: Send + Sync + std::fmt::Debug {
    fn send(&self, datagram: Bytes) -> Result<(), TransportError>;
}

/// An established connection handed over by the transport.
#[derive(Debug)]
pub struct Connection {
    peer: SocketAddr,
    sender: Arc<dyn DatagramSender>,
    events: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl Connection {
    pub fn new(
        peer: SocketAddr,
        sender: Arc<dyn DatagramSender>,
        events: mpsc::UnboundedReceiver<ConnectionEvent>,
    ) -> Self {
        Self { peer, sender, events }
    }

    /// Address and port reported for the remote side.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Split into the parts a session needs.
    pub fn into_parts(
        self,
    ) -> (
        SocketAddr,
        Arc<dyn DatagramSender>,
        mpsc::UnboundedReceiver<ConnectionEvent>,
    ) {
        (self.peer, self.sender, self.events)
    }
}

/// A running (or not yet bound) transport server.
pub trait SecureServer: Send {
    /// Start listening. Completion is reported through logging only.
    fn bind(&mut self, bind: &BindConfig);

    /// Stop listening and close every connection. Must tolerate repeated calls.
    fn close(&mut self);
}

/// Factory for transport servers.
pub trait Transport: Send + Sync {
    /// Create a server that reports its events on `events`.
    fn create_server(&self, events: ServerEventSender) -> Result<Box<dyn SecureServer>, TransportError>;
}
