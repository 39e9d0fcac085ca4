//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Datagram from peer
//!     → udp.rs (or another provider: demux by peer, handshake)
//!     → transport.rs (ServerEvent / ConnectionEvent contract)
//!     → peer.rs (ClientKey derived from address + port)
//!     → Hand off to the gateway
//!
//! Connection States:
//!     Handshaking → Established → Closed
//! ```
//!
//! # Design Decisions
//! - Providers are pluggable behind the `Transport` trait
//! - Sessions only ever see an established connection
//! - Peer identity is computed once per connection

pub mod peer;
pub mod transport;
pub mod udp;

pub use peer::{ClientKey, PeerLabel};
pub use transport::{
    Connection, ConnectionEvent, DatagramSender, SecureServer, ServerEvent, ServerEventReceiver,
    ServerEventSender, Transport, TransportError,
};
pub use udp::UdpTransport;
