//! Prometheus metrics for server health and game throughput.
//!
//! Exposed on a side port in Prometheus text format.

#![allow(dead_code)] // Some recorders are wired up by ops dashboards only.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter; metrics appear at
/// `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))
}

pub fn websocket_connections_active(count: u64) {
    metrics::gauge!("websocket_connections_active").set(count as f64);
}

pub fn websocket_connections_total() {
    metrics::counter!("websocket_connections_total").increment(1);
}

pub fn websocket_messages_received() {
    metrics::counter!("websocket_messages_received").increment(1);
}

pub fn websocket_messages_sent() {
    metrics::counter!("websocket_messages_sent").increment(1);
}

pub fn queue_joins_total(stake: i64) {
    metrics::counter!("queue_joins_total", "stake" => stake.to_string()).increment(1);
}

pub fn hands_settled_total() {
    metrics::counter!("hands_settled_total").increment(1);
}

pub fn reconnects_total() {
    metrics::counter!("reconnects_total").increment(1);
}

pub fn ledger_failures_total() {
    metrics::counter!("ledger_failures_total").increment(1);
}
