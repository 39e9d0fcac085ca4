//! In-process event bus.

use dashmap::DashMap;
use std::sync::Arc;

use crate::bus::{Bus, Listener, TopicKey};
use crate::codec::Packet;

/// Process-local [`Bus`] backed by a concurrent map of subscriptions.
///
/// Listeners are collected first and invoked after every map guard is
/// released, so a listener may publish or unsubscribe from inside its call.
#[derive(Clone, Default)]
pub struct EventBus {
    listeners: Arc<DashMap<TopicKey, Vec<Listener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of listeners registered on exactly `topic`.
    pub fn listener_count(&self, topic: &TopicKey) -> usize {
        self.listeners.get(topic).map(|l| l.len()).unwrap_or(0)
    }

    /// Number of distinct subscribed topics.
    pub fn topic_count(&self) -> usize {
        self.listeners.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("topics", &self.listeners.len())
            .finish()
    }
}

impl Bus for EventBus {
    fn on(&self, topic: TopicKey, listener: Listener) {
        tracing::trace!(topic = %topic, "Listener added");
        self.listeners.entry(topic).or_default().push(listener);
    }

    fn remove_listener(&self, topic: &TopicKey, listener: &Listener) {
        if let Some(mut registered) = self.listeners.get_mut(topic) {
            if let Some(pos) = registered.iter().position(|l| Arc::ptr_eq(l, listener)) {
                registered.remove(pos);
                tracing::trace!(topic = %topic, "Listener removed");
            }
        }
        self.listeners.remove_if(topic, |_, registered| registered.is_empty());
    }

    fn emit(&self, topic: &TopicKey, packet: &Packet) -> bool {
        let targets: Vec<Listener> = self
            .listeners
            .iter()
            .filter(|entry| entry.key().matches(topic))
            .flat_map(|entry| entry.value().clone())
            .collect();

        for listener in &targets {
            listener(packet);
        }
        !targets.is_empty()
    }
}
