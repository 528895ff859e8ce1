//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Upstream stream**: bars received, errors, reconnects, stream phase
//! - **Clients**: connected browser sockets, messages sent and dropped
//! - **REST**: upstream request counts and latencies per endpoint
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the dashboard HTTP port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::stream_state::{StreamPhase, StreamStatus};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Safe to call more than once; later calls return the first handle. If a
/// different global recorder is already installed, the handle still renders
/// but stays empty.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let recorder = PrometheusBuilder::new().build_recorder();
            let handle = recorder.handle();

            if let Err(e) = metrics::set_global_recorder(recorder) {
                tracing::warn!(error = %e, "Metrics recorder already installed");
            }

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Upstream stream
    describe_counter!(
        "dashboard_proxy_bars_received_total",
        "Total bar ticks received from the upstream stream"
    );
    describe_counter!(
        "dashboard_proxy_stream_errors_total",
        "Total upstream stream errors by kind"
    );
    describe_counter!(
        "dashboard_proxy_stream_reconnects_total",
        "Total upstream stream reconnection attempts"
    );
    describe_gauge!(
        "dashboard_proxy_stream_connected",
        "1 when the upstream stream is authenticated and usable"
    );
    describe_gauge!(
        "dashboard_proxy_stream_enabled",
        "0 once streaming has been permanently disabled"
    );

    // Browser clients
    describe_gauge!(
        "dashboard_proxy_ws_clients",
        "Number of connected browser WebSocket clients"
    );
    describe_gauge!(
        "dashboard_proxy_watched_symbols",
        "Number of symbols with at least one watching client"
    );
    describe_counter!(
        "dashboard_proxy_messages_sent_total",
        "Total messages queued to browser clients"
    );
    describe_counter!(
        "dashboard_proxy_messages_dropped_total",
        "Total messages dropped due to slow or closed clients"
    );

    // REST passthrough
    describe_counter!(
        "dashboard_proxy_upstream_requests_total",
        "Total upstream REST requests by endpoint and outcome"
    );
    describe_histogram!(
        "dashboard_proxy_upstream_request_seconds",
        "Upstream REST request latency"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Upstream REST endpoint labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Historical bars.
    Bars,
    /// Latest quote.
    Quote,
    /// Options chain snapshots.
    OptionsChain,
    /// Single contract snapshot.
    OptionContract,
}

impl Endpoint {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bars => "bars",
            Self::Quote => "quote",
            Self::OptionsChain => "options_chain",
            Self::OptionContract => "option_contract",
        }
    }
}

/// Record a bar tick received from the upstream stream.
pub fn record_bar_received() {
    counter!("dashboard_proxy_bars_received_total").increment(1);
}

/// Record an upstream stream error.
pub fn record_stream_error(error_type: &'static str) {
    counter!(
        "dashboard_proxy_stream_errors_total",
        "error_type" => error_type
    )
    .increment(1);
}

/// Record an upstream stream reconnection attempt.
pub fn record_reconnect() {
    counter!("dashboard_proxy_stream_reconnects_total").increment(1);
}

/// Publish the current stream status.
pub fn set_stream_status(status: StreamStatus, phase: StreamPhase) {
    gauge!("dashboard_proxy_stream_connected").set(if status.connected { 1.0 } else { 0.0 });
    gauge!("dashboard_proxy_stream_enabled").set(if status.enabled { 1.0 } else { 0.0 });
    tracing::debug!(phase = phase.as_str(), "Stream status updated");
}

/// Update the connected browser client count.
#[allow(clippy::cast_precision_loss)]
pub fn set_ws_clients(count: usize) {
    gauge!("dashboard_proxy_ws_clients").set(count as f64);
}

/// Update the watched symbol count.
#[allow(clippy::cast_precision_loss)]
pub fn set_watched_symbols(count: usize) {
    gauge!("dashboard_proxy_watched_symbols").set(count as f64);
}

/// Record a message queued to a browser client.
pub fn record_message_sent(message_type: &'static str) {
    counter!(
        "dashboard_proxy_messages_sent_total",
        "message_type" => message_type
    )
    .increment(1);
}

/// Record a message dropped for a browser client.
pub fn record_message_dropped(message_type: &'static str) {
    counter!(
        "dashboard_proxy_messages_dropped_total",
        "message_type" => message_type
    )
    .increment(1);
}

/// Record an upstream REST request outcome and latency.
pub fn record_upstream_request(endpoint: Endpoint, success: bool, duration: Duration) {
    counter!(
        "dashboard_proxy_upstream_requests_total",
        "endpoint" => endpoint.as_str(),
        "outcome" => if success { "success" } else { "error" }
    )
    .increment(1);
    histogram!(
        "dashboard_proxy_upstream_request_seconds",
        "endpoint" => endpoint.as_str()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
