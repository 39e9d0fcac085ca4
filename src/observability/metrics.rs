//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_handshakes_total` (counter): handshake attempts
//! - `gateway_transport_errors_total` (counter): peer-attributable transport errors
//! - `gateway_active_sessions` (gauge): established sessions
//! - `gateway_packets_ingress_total` (counter): decoded packets by cmd, consumed
//! - `gateway_decode_errors_total` (counter): malformed inbound frames
//! - `gateway_packets_egress_total` (counter): outbound packets by result

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_handshake() {
    counter!("gateway_handshakes_total").increment(1);
}

pub fn record_transport_error() {
    counter!("gateway_transport_errors_total").increment(1);
}

pub fn record_session_opened() {
    gauge!("gateway_active_sessions").increment(1.0);
}

pub fn record_session_closed() {
    gauge!("gateway_active_sessions").decrement(1.0);
}

pub fn record_ingress(cmd: &str, consumed: bool) {
    counter!(
        "gateway_packets_ingress_total",
        "cmd" => cmd.to_string(),
        "consumed" => if consumed { "true" } else { "false" }
    )
    .increment(1);
}

pub fn record_decode_error() {
    counter!("gateway_decode_errors_total").increment(1);
}

/// `result` is one of `sent`, `encode_error`, `send_error`.
pub fn record_egress(result: &'static str) {
    counter!("gateway_packets_egress_total", "result" => result).increment(1);
}
