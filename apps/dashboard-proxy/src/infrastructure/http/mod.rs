//! HTTP + WebSocket Server
//!
//! Axum server in front of the stream manager and the REST market data
//! adapter.
//!
//! # Endpoints
//!
//! - `GET /api/bars/{symbol}` - historical bars
//! - `GET /api/quote/{symbol}` - latest quote
//! - `GET /api/options/{symbol}` - options chain for the forward window
//! - `GET /api/option/{contract}` - single contract snapshot
//! - `GET /api/health` - stream status
//! - `GET /metrics` - Prometheus metrics in text format
//! - `GET /ws` - browser streaming protocol

mod error;
mod routes;
mod server;
mod ws;

use std::sync::Arc;
use std::time::Instant;

use crate::application::ports::MarketDataPort;
use crate::application::services::StreamManager;

pub use error::{ApiError, ApiResponse, ErrorBody};
pub use routes::create_router;
pub use server::{HttpServer, ServerError, serve};

/// Default capacity of each browser client's outbound queue.
pub const DEFAULT_CLIENT_QUEUE_CAPACITY: usize = 256;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Shared upstream stream.
    pub manager: Arc<StreamManager>,
    /// REST market data source.
    pub market_data: Arc<dyn MarketDataPort>,
    /// Outbound queue capacity per browser client.
    pub client_queue_capacity: usize,
    /// Process start, for uptime reporting.
    pub started_at: Instant,
}

impl AppState {
    /// Build state around a manager, sharing its REST source.
    #[must_use]
    pub fn new(manager: Arc<StreamManager>) -> Self {
        Self {
            market_data: manager.market_data(),
            manager,
            client_queue_capacity: DEFAULT_CLIENT_QUEUE_CAPACITY,
            started_at: Instant::now(),
        }
    }

    /// Override the per-client queue capacity.
    #[must_use]
    pub fn with_client_queue_capacity(mut self, capacity: usize) -> Self {
        self.client_queue_capacity = capacity;
        self
    }
}
