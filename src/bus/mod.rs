//! Publish/subscribe bus subsystem.
//!
//! # Data Flow
//! ```text
//! Session inbound  → Bus::emit([ingress, key, cmd], packet) → type-specific subscribers
//! Bus producers    → Bus::emit([egress, key, cmd], packet)  → session's egress listener
//! ```
//!
//! # Design Decisions
//! - The bus is injected, never global
//! - Listener identity is `Arc` pointer identity, so removal needs the same handle
//! - `emit` reports whether anybody received the packet

pub mod memory;
pub mod topic;

use std::sync::Arc;

use crate::codec::Packet;

pub use memory::EventBus;
pub use topic::{TopicKey, WILDCARD};

/// A bus subscriber. Invoked synchronously from `emit`.
pub type Listener = Arc<dyn Fn(&Packet) + Send + Sync>;

/// Publish/subscribe bus addressed by [`TopicKey`]s.
pub trait Bus: Send + Sync {
    /// Register `listener` for events matching `topic`.
    fn on(&self, topic: TopicKey, listener: Listener);

    /// Remove a listener registered with a structurally equal `topic` and the same handle.
    fn remove_listener(&self, topic: &TopicKey, listener: &Listener);

    /// Publish `packet`. Returns `true` if at least one listener received it.
    fn emit(&self, topic: &TopicKey, packet: &Packet) -> bool;
}
