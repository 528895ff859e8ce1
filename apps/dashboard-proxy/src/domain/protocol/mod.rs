//! Browser WebSocket Protocol
//!
//! Closed message sets exchanged with browser clients over `/ws`.
//!
//! # Client → Server
//! ```json
//! {"type":"subscribe","symbol":"AAPL"}
//! {"type":"unsubscribe"}
//! ```
//!
//! # Server → Client
//! ```json
//! {"type":"stock_bar","data":{"symbol":"AAPL","time":"...","open":1.0,...}}
//! {"type":"options_snapshot","data":{"AAPL240315C00172500":{...}}}
//! {"type":"subscribed","symbol":"AAPL"}
//! {"type":"error","error":"..."}
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::streaming::{Bar, OptionsChain, normalize_symbol};

/// Error sent when a bar subscription is requested while the upstream stream
/// is unusable.
pub const STREAM_UNAVAILABLE_MESSAGE: &str =
    "Real-time streaming not available - using REST API only";

// =============================================================================
// Client Messages
// =============================================================================

/// Control message sent by a browser client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Watch a symbol, replacing any previous one.
    Subscribe {
        /// Requested symbol.
        symbol: String,
    },
    /// Stop watching the current symbol.
    Unsubscribe,
}

/// Error parsing a client control message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Not JSON, or not one of the known message shapes.
    #[error("Invalid message: {0}")]
    Malformed(String),

    /// Subscribe message with an unusable symbol.
    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),
}

impl ClientMessage {
    /// Parse and validate a text frame.
    ///
    /// Subscribe symbols are normalized (trimmed, upper-cased).
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError` if the frame is not a known message or the
    /// symbol is invalid.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let message: Self =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        match message {
            Self::Subscribe { symbol } => normalize_symbol(&symbol)
                .map(|symbol| Self::Subscribe { symbol })
                .ok_or(ProtocolError::InvalidSymbol(symbol)),
            Self::Unsubscribe => Ok(Self::Unsubscribe),
        }
    }
}

// =============================================================================
// Server Messages
// =============================================================================

/// Message pushed to a browser client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Real-time bar tick for the watched symbol.
    StockBar {
        /// The bar, forwarded verbatim.
        data: Bar,
    },
    /// Options chain for the watched symbol.
    OptionsSnapshot {
        /// Snapshots keyed by contract symbol.
        data: OptionsChain,
    },
    /// Subscribe request processed.
    Subscribed {
        /// Symbol now watched.
        symbol: String,
    },
    /// Informational error for this client only.
    Error {
        /// Human-readable description.
        error: String,
    },
}

impl ServerMessage {
    /// Build an error message.
    #[must_use]
    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }

    /// Error telling the client that only REST data is available.
    #[must_use]
    pub fn stream_unavailable() -> Self {
        Self::error(STREAM_UNAVAILABLE_MESSAGE)
    }

    /// Message kind label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::StockBar { .. } => "stock_bar",
            Self::OptionsSnapshot { .. } => "options_snapshot",
            Self::Subscribed { .. } => "subscribed",
            Self::Error { .. } => "error",
        }
    }

    /// Serialize to a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Tests
// =============================================================================
