//! Plaintext UDP transport provider.
//!
//! # Responsibilities
//! - Bind a UDP socket and demultiplex datagrams by peer address
//! - Emit one `Connection` + `SecureConnection` pair for every new peer
//! - Enforce the session limit and the idle timeout
//! - Drop datagrams above the size limit instead of passing on a truncated copy
//! - Close every peer when the server is closed
//!
//! # Design Decisions
//! - No handshake: a peer is "established" on its first datagram
//! - The receive loop is the only owner of the peer table (no locking)
//! - Sends use `try_send_to` so they never block a bus listener

use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::{BindConfig, TransportConfig};
use crate::net::transport::{
    Connection, ConnectionEvent, DatagramSender, SecureServer, ServerEvent, ServerEventSender,
    Transport, TransportError,
};

/// Factory for [`UdpServer`]s.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    config: TransportConfig,
    bound: Arc<watch::Sender<Option<SocketAddr>>>,
}

impl UdpTransport {
    pub fn new(config: TransportConfig) -> Self {
        let (bound, _) = watch::channel(None);
        Self {
            config,
            bound: Arc::new(bound),
        }
    }

    /// Watch the local address of the most recently bound server.
    ///
    /// Holds `None` until the socket is bound and again after it is closed.
    pub fn local_addr(&self) -> watch::Receiver<Option<SocketAddr>> {
        self.bound.subscribe()
    }
}

impl Transport for UdpTransport {
    fn create_server(&self, events: ServerEventSender) -> Result<Box<dyn SecureServer>, TransportError> {
        if self.config.max_datagram_size == 0 {
            return Err(TransportError::Create(
                "max_datagram_size must be greater than zero".to_string(),
            ));
        }
        Ok(Box::new(UdpServer {
            config: self.config.clone(),
            events,
            bound: Arc::clone(&self.bound),
            shutdown: None,
            task: None,
        }))
    }
}

/// A UDP server created by [`UdpTransport`].
pub struct UdpServer {
    config: TransportConfig,
    events: ServerEventSender,
    bound: Arc<watch::Sender<Option<SocketAddr>>>,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl SecureServer for UdpServer {
    fn bind(&mut self, bind: &BindConfig) {
        if self.task.is_some() {
            tracing::warn!(address = %bind, "Datagram transport already bound, ignoring bind");
            return;
        }

        let addr = match bind.socket_addr() {
            Ok(addr) => addr,
            Err(e) => {
                let error = TransportError::Bind {
                    address: bind.to_string(),
                    reason: e.to_string(),
                };
                tracing::error!(error = %error, "Invalid bind address");
                return;
            }
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(address = %addr, error = %e, "No async runtime to bind on");
                return;
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let receiver = Receiver {
            config: self.config.clone(),
            events: self.events.clone(),
            bound: Arc::clone(&self.bound),
            peers: HashMap::new(),
        };
        self.task = Some(runtime.spawn(receiver.run(addr, shutdown_rx)));
        self.shutdown = Some(shutdown_tx);
    }

    fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
            tracing::debug!("Datagram transport closing");
        }
        // The receive task finishes on its own once it observes the signal.
        self.task.take();
    }
}

impl Drop for UdpServer {
    fn drop(&mut self) {
        self.close();
    }
}

/// Send half handed to sessions.
#[derive(Debug)]
struct UdpSender {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl DatagramSender for UdpSender {
    fn send(&self, datagram: Bytes) -> Result<(), TransportError> {
        self.socket
            .try_send_to(&datagram, self.peer)
            .map(|_| ())
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

struct PeerEntry {
    events: mpsc::UnboundedSender<ConnectionEvent>,
    last_seen: Instant,
}

struct Receiver {
    config: TransportConfig,
    events: ServerEventSender,
    bound: Arc<watch::Sender<Option<SocketAddr>>>,
    peers: HashMap<SocketAddr, PeerEntry>,
}

impl Receiver {
    async fn run(mut self, addr: SocketAddr, mut shutdown: watch::Receiver<bool>) {
        let socket = match UdpSocket::bind(addr).await {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                let error = TransportError::Bind {
                    address: addr.to_string(),
                    reason: e.to_string(),
                };
                tracing::error!(error = %error, "Failed to bind datagram socket");
                return;
            }
        };

        let local_addr = socket.local_addr().unwrap_or(addr);
        self.bound.send_replace(Some(local_addr));
        tracing::info!(
            address = %local_addr,
            max_sessions = self.config.max_sessions,
            "Datagram transport bound"
        );

        let idle_timeout = Duration::from_secs(self.config.idle_timeout_secs);
        let mut sweep = tokio::time::interval((idle_timeout / 2).max(Duration::from_millis(50)));
        // One spare byte tells an oversized datagram apart from one that fits exactly.
        let limit = self.config.max_datagram_size;
        let mut buf = vec![0u8; limit + 1];

        loop {
            tokio::select! {
                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, peer)) if len > limit => {
                        tracing::warn!(peer = %peer, limit, "Oversized datagram dropped");
                        let _ = self.events.send(ServerEvent::Error {
                            peer,
                            error: TransportError::Oversized { limit },
                        });
                    }
                    Ok((len, peer)) => {
                        let datagram = Bytes::copy_from_slice(&buf[..len]);
                        self.dispatch(&socket, peer, datagram);
                    }
                    Err(e) => tracing::warn!(error = %e, "Datagram receive failed"),
                },
                _ = sweep.tick() => self.expire_idle(idle_timeout),
                _ = shutdown.changed() => break,
            }
        }

        for (peer, entry) in self.peers.drain() {
            tracing::trace!(peer = %peer, "Closing peer on shutdown");
            let _ = entry.events.send(ConnectionEvent::Close);
        }
        self.bound.send_replace(None);
        tracing::info!(address = %local_addr, "Datagram transport closed");
    }

    fn dispatch(&mut self, socket: &Arc<UdpSocket>, peer: SocketAddr, datagram: Bytes) {
        if let Some(entry) = self.peers.get_mut(&peer) {
            entry.last_seen = Instant::now();
            if entry.events.send(ConnectionEvent::Message(datagram)).is_err() {
                // Session already gone; the next datagram starts a fresh one.
                self.peers.remove(&peer);
            }
            return;
        }

        if self.peers.len() >= self.config.max_sessions {
            let _ = self.events.send(ServerEvent::Error {
                peer,
                error: TransportError::Refused("session limit reached".to_string()),
            });
            return;
        }

        let _ = self.events.send(ServerEvent::Connection { peer });

        let (tx, rx) = mpsc::unbounded_channel();
        let sender = Arc::new(UdpSender {
            socket: Arc::clone(socket),
            peer,
        });
        let _ = self
            .events
            .send(ServerEvent::SecureConnection(Connection::new(peer, sender, rx)));
        let _ = tx.send(ConnectionEvent::Message(datagram));

        self.peers.insert(
            peer,
            PeerEntry {
                events: tx,
                last_seen: Instant::now(),
            },
        );
    }

    fn expire_idle(&mut self, idle_timeout: Duration) {
        let now = Instant::now();
        self.peers.retain(|peer, entry| {
            let alive = now.duration_since(entry.last_seen) < idle_timeout && !entry.events.is_closed();
            if !alive {
                tracing::debug!(peer = %peer, "Peer idle, closing connection");
                let _ = entry.events.send(ConnectionEvent::Close);
            }
            alive
        });
    }
}
