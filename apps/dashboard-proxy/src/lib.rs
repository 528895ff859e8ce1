#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Dashboard Proxy - Market Data Gateway
//!
//! An HTTP + WebSocket gateway that keeps a single connection to Alpaca's
//! stock data stream and fans minute bars out to many browser clients.
//! REST endpoints proxy historical bars, quotes and options chains, and keep
//! working when streaming is unavailable.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core market data types and lifecycle rules
//!   - `streaming`: Bars, quotes, option snapshots
//!   - `protocol`: Browser WebSocket messages
//!   - `stream_state`: Upstream connection state machine
//!   - `subscription`: Per-symbol routing of bars to clients
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Upstream stream and REST market data interfaces
//!   - `services`: Stream manager, per-client sessions
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `alpaca`: REST client and stock stream client
//!   - `http`: Axum routes and `/ws` endpoint
//!   - `config`: Environment configuration
//!   - `health`, `metrics`, `telemetry`: Operational surface
//!
//! # Data Flow
//!
//! ```text
//!                          ┌───────────────┐      ┌──────────┐
//! Alpaca stock stream ────►│ StreamManager │─────►│  /ws     │──► Browser 1
//!                          │  (bar router) │      │ sessions │──► Browser N
//!                          └───────┬───────┘      └──────────┘
//! Alpaca REST ◄────────────────────┴──────────────── /api/* routes
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core market data types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::protocol::{ClientMessage, ServerMessage};
pub use domain::stream_state::{StreamPhase, StreamStatus};
pub use domain::streaming::{Bar, OptionSnapshot, OptionsChain, Quote};

// Application services
pub use application::ports::{MarketDataError, MarketDataPort, StreamConnector};
pub use application::services::{ClientHandle, ClientSession, StreamManager};

// Infrastructure config
pub use infrastructure::config::{ConfigError, DashboardConfig};

// HTTP server
pub use infrastructure::http::{AppState, HttpServer, ServerError, create_router};

// Alpaca adapters
pub use infrastructure::alpaca::{AlpacaRestClient, AlpacaStreamConnector};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
