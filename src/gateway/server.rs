//! Server adapter: transport events → sessions.
//!
//! # Responsibilities
//! - Create the secure server and own it for the gateway's lifetime
//! - Log handshake progress and peer-attributable errors
//! - Spawn one session task per established connection
//! - Stop the server and every session on request
//!
//! # Design Decisions
//! - Construction is split into attach (create server) and start (bind) so
//!   creation failures surface before anything listens
//! - Bind completion is not awaited; bind failures are the transport's to report
//! - Stopping twice is a no-op

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};

use crate::bus::Bus;
use crate::codec::Codec;
use crate::config::{BindConfig, GatewayConfig, TopicConfig};
use crate::gateway::session::{Session, SessionContext};
use crate::lifecycle::Shutdown;
use crate::net::peer::{ClientKey, PeerLabel};
use crate::net::transport::{
    Connection, SecureServer, ServerEvent, ServerEventReceiver, Transport, TransportError,
};
use crate::observability::{message_ids, metrics, LogFields, LogHooks};

/// Gateway options.
#[derive(Debug, Clone, Default)]
pub struct GatewayOptions {
    /// Passed unchanged to the server's bind.
    pub bind: BindConfig,
    pub log: LogHooks,
    pub topics: TopicConfig,
}

impl GatewayOptions {
    /// Options from a loaded config, with hooks forwarding into `tracing`.
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            bind: config.bind.clone(),
            log: LogHooks::tracing(&config.log),
            topics: config.topics.clone(),
        }
    }
}

/// A configured gateway, not yet attached to a bus.
pub struct Gateway {
    options: GatewayOptions,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn Codec>,
}

/// Configure a gateway over `transport`, speaking `codec` to its peers.
pub fn configure(
    options: GatewayOptions,
    transport: Arc<dyn Transport>,
    codec: Arc<dyn Codec>,
) -> Gateway {
    Gateway {
        options,
        transport,
        codec,
    }
}

impl Gateway {
    /// Create the secure server and start dispatching its events onto `bus`.
    ///
    /// A server creation failure is returned exactly as the transport reported it.
    pub async fn attach(self, bus: Arc<dyn Bus>) -> Result<Start, TransportError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let server = self.transport.create_server(tx)?;

        let shutdown = Shutdown::new();
        let dispatcher = Dispatcher {
            ctx: SessionContext {
                bus,
                codec: self.codec,
                log: self.options.log,
                topics: self.options.topics,
            },
            events: rx,
            stop: shutdown.subscribe(),
            shutdown: shutdown.clone(),
            sessions: JoinSet::new(),
        };
        let task = tokio::spawn(dispatcher.run());

        tracing::debug!(bind = %self.options.bind, "Gateway attached");

        Ok(Start {
            server,
            bind: self.options.bind,
            shutdown,
            task,
        })
    }
}

/// An attached gateway whose server is not bound yet.
pub struct Start {
    server: Box<dyn SecureServer>,
    bind: BindConfig,
    shutdown: Shutdown,
    task: JoinHandle<()>,
}

impl Start {
    /// Bind the server to the configured address.
    pub fn start(mut self) -> StopHandle {
        self.server.bind(&self.bind);
        tracing::info!(bind = %self.bind, "Gateway started");

        StopHandle {
            server: self.server,
            shutdown: self.shutdown,
            task: Some(self.task),
        }
    }
}

/// Handle to a running gateway.
pub struct StopHandle {
    server: Box<dyn SecureServer>,
    shutdown: Shutdown,
    task: Option<JoinHandle<()>>,
}

impl StopHandle {
    /// Close the server, close every session, wait for the dispatcher.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        self.server.close();
        self.shutdown.trigger();

        if let Err(e) = task.await {
            tracing::error!(error = %e, "Gateway dispatcher failed");
        }
        tracing::info!("Gateway stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.task.is_none()
    }
}

impl Drop for StopHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.server.close();
            self.shutdown.trigger();
        }
    }
}

/// Consumes server events; owns every session task.
struct Dispatcher {
    ctx: SessionContext,
    events: ServerEventReceiver,
    stop: broadcast::Receiver<()>,
    shutdown: Shutdown,
    sessions: JoinSet<()>,
}

impl Dispatcher {
    async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => {
                        tracing::debug!("Server event stream ended");
                        break;
                    }
                },
                _ = self.stop.recv() => break,
                Some(joined) = self.sessions.join_next(), if !self.sessions.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Session task failed");
                    }
                }
            }
        }

        self.shutdown.trigger();
        while let Some(joined) = self.sessions.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Session task failed");
            }
        }
    }

    fn dispatch(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Connection { peer } => {
                metrics::record_handshake();
                self.ctx.log.debug(|| {
                    (
                        format!("Handshake started by {}", PeerLabel(&peer)),
                        LogFields::new(message_ids::HANDSHAKE_STARTED, &ClientKey::from_peer(&peer)),
                    )
                });
            }
            ServerEvent::Error { peer, error } => {
                metrics::record_transport_error();
                self.ctx.log.warn(|| {
                    (
                        format!("Error caused by {}: {}", PeerLabel(&peer), error),
                        LogFields::new(message_ids::PEER_ERROR, &ClientKey::from_peer(&peer)),
                    )
                });
            }
            ServerEvent::SecureConnection(connection) => self.establish(connection),
        }
    }

    fn establish(&mut self, connection: Connection) {
        let (peer, sender, events) = connection.into_parts();

        let stop = self.shutdown.subscribe();
        if self.shutdown.is_triggered() {
            tracing::debug!(peer = %peer, "Gateway stopping, dropping established connection");
            return;
        }
        let session = Session::open(peer, sender, &self.ctx);

        self.ctx.log.debug(|| {
            (
                format!("Handshake successfully finished with {}", PeerLabel(&peer)),
                LogFields::new(message_ids::HANDSHAKE_FINISHED, session.client_key()),
            )
        });

        self.sessions.spawn(session.run(events, stop));
    }
}
