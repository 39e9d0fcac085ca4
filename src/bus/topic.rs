//! Structured bus topic keys.

use std::fmt;

use crate::net::peer::ClientKey;

/// Segment matching any value.
pub const WILDCARD: &str = "*";

/// Ordered `[direction, client_key, discriminator]` tuple.
///
/// Equality is structural: two keys built from the same three values are
/// the same key, which is what subscribe/unsubscribe matching relies on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicKey {
    direction: String,
    client_key: String,
    discriminator: String,
}

impl TopicKey {
    pub fn new(
        direction: impl Into<String>,
        client_key: impl Into<String>,
        discriminator: impl Into<String>,
    ) -> Self {
        Self {
            direction: direction.into(),
            client_key: client_key.into(),
            discriminator: discriminator.into(),
        }
    }

    /// Topic a decoded packet from `client_key` is published on.
    pub fn ingress(direction: &str, client_key: &ClientKey, cmd: &str) -> Self {
        Self::new(direction, client_key.as_str(), cmd)
    }

    /// Topic matching every packet addressed to `client_key`.
    pub fn egress(direction: &str, client_key: &ClientKey) -> Self {
        Self::new(direction, client_key.as_str(), WILDCARD)
    }

    pub fn segments(&self) -> [&str; 3] {
        [&self.direction, &self.client_key, &self.discriminator]
    }

    /// Whether a subscription on `self` receives events published on `topic`.
    ///
    /// Segments match when equal or when this key's segment is `*`.
    pub fn matches(&self, topic: &TopicKey) -> bool {
        self.segments()
            .iter()
            .zip(topic.segments().iter())
            .all(|(pattern, value)| *pattern == WILDCARD || pattern == value)
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.direction, self.client_key, self.discriminator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality() {
        let key = ClientKey::new("::1", 12345);
        assert_eq!(
            TopicKey::egress("snUnicastOutgress", &key),
            TopicKey::new("snUnicastOutgress", "::1_12345", "*")
        );
    }

    #[test]
    fn wildcard_matches_any_discriminator() {
        let key = ClientKey::new("::1", 12345);
        let subscription = TopicKey::egress("egress", &key);
        assert!(subscription.matches(&TopicKey::new("egress", "::1_12345", "publish")));
        assert!(subscription.matches(&TopicKey::new("egress", "::1_12345", "*")));
        assert!(!subscription.matches(&TopicKey::new("egress", "::1_54321", "publish")));
        assert!(!subscription.matches(&TopicKey::new("ingress", "::1_12345", "publish")));
    }

    #[test]
    fn exact_key_does_not_match_other_commands() {
        let topic = TopicKey::new("ingress", "k", "connect");
        assert!(topic.matches(&topic.clone()));
        assert!(!topic.matches(&TopicKey::new("ingress", "k", "publish")));
    }
}
