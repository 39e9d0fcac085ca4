//! Peer identity.
//!
//! Every session is addressed by a [`ClientKey`] derived from the peer's
//! address and port. The same key names the session in log records, in bus
//! topics and in session lookups.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// Separator between address and port inside a [`ClientKey`].
pub const KEY_SEPARATOR: char = '_';

/// Stable identity of a remote peer, `<address>_<port>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientKey(String);

impl ClientKey {
    /// Build a key from a textual address and a port.
    pub fn new(address: &str, port: u16) -> Self {
        Self(format!("{}{}{}", address, KEY_SEPARATOR, port))
    }

    /// Build a key from a socket address. IPv6 addresses are used without brackets.
    pub fn from_peer(peer: &SocketAddr) -> Self {
        Self::new(&peer.ip().to_string(), peer.port())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&SocketAddr> for ClientKey {
    fn from(peer: &SocketAddr) -> Self {
        Self::from_peer(peer)
    }
}

impl AsRef<str> for ClientKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Human readable peer label used in log messages: `[<address>]:<port>`.
///
/// Unlike `SocketAddr`'s `Display`, IPv4 addresses are bracketed too, so every
/// message has the same shape regardless of address family.
#[derive(Debug, Clone, Copy)]
pub struct PeerLabel<'a>(pub &'a SocketAddr);

impl fmt::Display for PeerLabel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]:{}", self.0.ip(), self.0.port())
    }
}
