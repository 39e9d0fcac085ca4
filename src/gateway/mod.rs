//! Gateway core: secure transport ↔ bus.
//!
//! # Data Flow
//! ```text
//! Transport events → server.rs (dispatcher)
//!     Connection       → debug "Handshake started by …"
//!     Error            → warn  "Error caused by …"
//!     SecureConnection → session.rs (open, spawn task)
//!
//! Session task:
//!     Message(bytes) → inbound.rs  → Decoder → Bus::emit([ingress, key, cmd])
//!     Bus [egress, key, *] → outbound.rs → Codec::generate → DatagramSender
//!     Close          → unsubscribe, debug "Connection to … closed"
//! ```
//!
//! # Design Decisions
//! - Only server creation failure is returned to the caller; everything
//!   peer-caused goes to the log hooks
//! - One task per session keeps each peer's traffic in arrival order

pub mod inbound;
pub mod outbound;
pub mod server;
pub mod session;

pub use server::{configure, Gateway, GatewayOptions, Start, StopHandle};
pub use session::{Session, SessionContext};
