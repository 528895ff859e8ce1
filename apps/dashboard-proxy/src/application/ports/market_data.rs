//! REST market data port.

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::streaming::{Bar, OptionSnapshot, OptionsChain, OptionsWindow, Quote};

/// Default bar timeframe when the caller gives none.
pub const DEFAULT_TIMEFRAME: &str = "1Day";

// =============================================================================
// Queries
// =============================================================================

/// Historical bars request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarsQuery {
    /// Ticker symbol.
    pub symbol: String,
    /// Bar timeframe, e.g. `1Min`, `1Hour`, `1Day`.
    pub timeframe: String,
    /// Inclusive start (RFC 3339 or `YYYY-MM-DD`).
    pub start: Option<String>,
    /// Inclusive end (RFC 3339 or `YYYY-MM-DD`).
    pub end: Option<String>,
    /// Maximum number of bars.
    pub limit: Option<u32>,
}

impl BarsQuery {
    /// Daily bars with no range or limit.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe: DEFAULT_TIMEFRAME.to_string(),
            start: None,
            end: None,
            limit: None,
        }
    }
}

/// Options chain request for one underlying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionsQuery {
    /// Underlying ticker.
    pub underlying: String,
    /// Earliest expiration (inclusive).
    pub expiration_gte: Option<NaiveDate>,
    /// Latest expiration (inclusive).
    pub expiration_lte: Option<NaiveDate>,
    /// Strip snapshots down to the grid fields.
    pub minimal: bool,
}

impl OptionsQuery {
    /// Full chain with no expiration bounds.
    #[must_use]
    pub fn new(underlying: impl Into<String>) -> Self {
        Self {
            underlying: underlying.into(),
            expiration_gte: None,
            expiration_lte: None,
            minimal: false,
        }
    }

    /// Restrict to an expiration window.
    #[must_use]
    pub const fn with_window(mut self, window: OptionsWindow) -> Self {
        self.expiration_gte = Some(window.expiration_gte);
        self.expiration_lte = Some(window.expiration_lte);
        self
    }

    /// Request the minimal projection.
    #[must_use]
    pub const fn minimal(mut self, minimal: bool) -> Self {
        self.minimal = minimal;
        self
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Failure fetching REST market data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MarketDataError {
    /// Upstream rejected our credentials.
    #[error("Upstream authentication failed: {0}")]
    Unauthorized(String),

    /// Symbol or contract does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Upstream rate limit hit.
    #[error("Rate limited by upstream")]
    RateLimited {
        /// Seconds to wait, when the upstream said.
        retry_after_secs: Option<u64>,
    },

    /// Request parameters rejected.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Upstream returned an unexpected error.
    #[error("Upstream error ({status}): {message}")]
    Upstream {
        /// HTTP status code.
        status: u16,
        /// Error body or description.
        message: String,
    },

    /// Network failure talking to the upstream.
    #[error("Network error: {0}")]
    Network(String),

    /// Upstream response could not be decoded.
    #[error("Failed to decode upstream response: {0}")]
    Decode(String),
}

// =============================================================================
// Port
// =============================================================================

/// REST market data source.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Historical bars for a symbol.
    async fn get_bars(&self, query: &BarsQuery) -> Result<Vec<Bar>, MarketDataError>;

    /// Latest quote for a symbol.
    async fn get_latest_quote(&self, symbol: &str) -> Result<Quote, MarketDataError>;

    /// Options chain for an underlying: calls and puts merged by contract.
    async fn get_options_snapshots(
        &self,
        query: &OptionsQuery,
    ) -> Result<OptionsChain, MarketDataError>;

    /// Snapshot for a single OCC contract symbol.
    async fn get_option_snapshot(
        &self,
        contract_symbol: &str,
    ) -> Result<OptionSnapshot, MarketDataError>;
}
