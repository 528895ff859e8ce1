//! Health Check and Metrics Endpoint
//!
//! Stream status reporting for the dashboard and Prometheus metrics for
//! monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /api/health` - JSON stream status
//! - `GET /metrics` - Prometheus metrics in text format

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::domain::stream_state::{StreamPhase, StreamStatus};
use crate::infrastructure::http::AppState;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `true`; the gateway answers even when streaming is down.
    pub success: bool,
    /// Upstream stream status.
    pub status: HealthStatus,
    /// Upstream stream is authenticated and usable.
    pub streaming: bool,
    /// Streaming has not been permanently disabled.
    pub streaming_enabled: bool,
    /// Stream lifecycle phase.
    pub phase: &'static str,
    /// Connected browser clients.
    pub clients: usize,
    /// Gateway version.
    pub version: &'static str,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
}

/// Upstream stream status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Bars are streaming.
    Connected,
    /// REST only.
    Disconnected,
}

impl HealthResponse {
    /// Build a response from a stream status snapshot.
    #[must_use]
    pub const fn from_status(
        status: StreamStatus,
        phase: StreamPhase,
        clients: usize,
        uptime_secs: u64,
    ) -> Self {
        Self {
            success: true,
            status: if status.connected {
                HealthStatus::Connected
            } else {
                HealthStatus::Disconnected
            },
            streaming: status.connected,
            streaming_enabled: status.enabled,
            phase: phase.as_str(),
            clients,
            version: env!("CARGO_PKG_VERSION"),
            uptime_secs,
        }
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

/// `GET /api/health`
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::from_status(
        state.manager.status(),
        state.manager.phase(),
        state.manager.client_count(),
        state.started_at.elapsed().as_secs(),
    ))
}

/// `GET /metrics`
pub async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

// =============================================================================
// Tests
// =============================================================================
