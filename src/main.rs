//! MQTT-SN datagram gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!     Peer datagrams           ┌──────────────────────────────────────────────┐
//!     ─────────────────────────┼─▶ net (transport) ─▶ gateway (dispatcher)    │
//!                              │                        │                     │
//!                              │                        ▼                     │
//!                              │                   session task               │
//!                              │            decode ─▶ bus [ingress, key, cmd] │
//!     ◀────────────────────────┼── encode ◀── bus [egress, key, *]            │
//!                              │                                              │
//!                              │  config · lifecycle · observability          │
//!                              └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use mqttsn_dtls_gateway::config::{load_config, GatewayConfig};
use mqttsn_dtls_gateway::lifecycle::signals::shutdown_signal;
use mqttsn_dtls_gateway::observability::{init_tracing, metrics};
use mqttsn_dtls_gateway::{configure, EventBus, GatewayOptions, MqttSnCodec, UdpTransport};

#[derive(Parser)]
#[command(name = "mqttsn-dtls-gateway")]
#[command(about = "Bridge MQTT-SN datagram sessions onto an event bus", long_about = None)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    init_tracing(&config.observability.log_level);
    tracing::info!("mqttsn-dtls-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind = %config.bind,
        idle_timeout_secs = config.transport.idle_timeout_secs,
        max_sessions = config.transport.max_sessions,
        ingress = %config.topics.ingress,
        egress = %config.topics.egress,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let transport = Arc::new(UdpTransport::new(config.transport.clone()));
    let bus = Arc::new(EventBus::new());

    let gateway = configure(
        GatewayOptions::from_config(&config),
        transport,
        Arc::new(MqttSnCodec),
    );
    let mut running = gateway.attach(bus).await?.start();

    shutdown_signal().await;

    running.stop().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
