//! Metrics collection and export.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format. The engine records its own relay and typing
//! counters under the same prefix.

use anyhow::{Context, Result};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "skillswap_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "skillswap_connections_active";
    pub const EVENTS_TOTAL: &str = "skillswap_events_total";
    pub const FRAME_BYTES: &str = "skillswap_frame_bytes";
    pub const CHANNELS_ACTIVE: &str = "skillswap_channels_active";
    pub const EVENT_LATENCY_SECONDS: &str = "skillswap_event_latency_seconds";
    pub const ERRORS_TOTAL: &str = "skillswap_errors_total";
    pub const MATCHES_CREATED_TOTAL: &str = "skillswap_matches_created_total";
    pub const MESSAGES_RELAYED_TOTAL: &str = "skillswap_messages_relayed_total";
    pub const MESSAGE_ERRORS_TOTAL: &str = "skillswap_message_errors_total";
    pub const TYPING_EXPIRED_TOTAL: &str = "skillswap_typing_expired_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(names::EVENTS_TOTAL, "Client events received, by kind");
    metrics::describe_counter!(names::FRAME_BYTES, "WebSocket frame bytes, by direction");
    metrics::describe_gauge!(names::CHANNELS_ACTIVE, "Match channels with at least one member");
    metrics::describe_histogram!(
        names::EVENT_LATENCY_SECONDS,
        "Client event handling latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Transport and decode errors");
    metrics::describe_counter!(names::MATCHES_CREATED_TOTAL, "Matches created");
    metrics::describe_counter!(names::MESSAGES_RELAYED_TOTAL, "Chat messages persisted and delivered");
    metrics::describe_counter!(names::MESSAGE_ERRORS_TOTAL, "Chat messages rejected, by error kind");
    metrics::describe_counter!(names::TYPING_EXPIRED_TOTAL, "Typing indicators expired by the sweep");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed.
pub fn start_metrics_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record an inbound client event.
pub fn record_event(kind: &'static str) {
    counter!(names::EVENTS_TOTAL, "kind" => kind).increment(1);
}

/// Record frame bytes in one direction.
pub fn record_frame(bytes: usize, direction: &'static str) {
    counter!(names::FRAME_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Record event handling latency.
pub fn record_latency(seconds: f64) {
    histogram!(names::EVENT_LATENCY_SECONDS).record(seconds);
}

/// Update active channel count.
pub fn set_active_channels(count: usize) {
    gauge!(names::CHANNELS_ACTIVE).set(count as f64);
}

/// Record a created match.
pub fn record_match_created() {
    counter!(names::MATCHES_CREATED_TOTAL).increment(1);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
