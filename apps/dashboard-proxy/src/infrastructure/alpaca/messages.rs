//! Stock Stream Message Types
//!
//! Wire format types for the stock data WebSocket. Every inbound frame is a
//! JSON array of objects discriminated by a `T` field.
//!
//! # Message Types
//!
//! ## Control
//! - `success`: connection greeting or authentication success
//! - `error`: error response with code and message
//! - `subscription`: current subscription set after a change
//!
//! ## Data
//! - `b` / `d` / `u`: minute, daily and updated bars
//!
//! Quotes, trades and other channels are never subscribed by this gateway.
//!
//! # References
//!
//! - [Stock Streaming](https://docs.alpaca.markets/docs/real-time-stock-pricing-data)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::streaming::Bar;

// =============================================================================
// Control Messages
// =============================================================================

/// Success message indicating connection or authentication succeeded.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "success", "msg": "connected"}
/// {"T": "success", "msg": "authenticated"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessMessage {
    /// Message type (always "success")
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Success message: "connected" or "authenticated"
    pub msg: SuccessKind,
}

/// Kind of success message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuccessKind {
    /// Socket open, send auth next
    Connected,
    /// Credentials accepted
    Authenticated,
    /// Any other success notice
    #[serde(other)]
    Unknown,
}

/// Error message with code and description.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "error", "code": 402, "msg": "auth failed"}
/// ```
///
/// # Error Codes
/// - 400: Invalid syntax
/// - 401-404: Authentication problems
/// - 405: Symbol limit exceeded
/// - 406: Connection limit exceeded
/// - 407: Slow client
/// - 408: Insufficient subscription
/// - 409: Not allowed (internal)
/// - 500: Internal error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Message type (always "error")
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Error code
    pub code: i32,

    /// Error message
    pub msg: String,
}

/// Subscription confirmation message.
///
/// # Wire Format (JSON)
/// ```json
/// {"T": "subscription", "trades": [], "quotes": [], "bars": ["AAPL"]}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionMessage {
    /// Message type (always "subscription")
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Subscribed bar symbols
    #[serde(default)]
    pub bars: Vec<String>,

    /// Subscribed daily bar symbols
    #[serde(default, rename = "dailyBars")]
    pub daily_bars: Vec<String>,

    /// Subscribed updated bar symbols
    #[serde(default, rename = "updatedBars")]
    pub updated_bars: Vec<String>,
}

// =============================================================================
// Data Messages
// =============================================================================

/// Real-time stock bar (OHLCV).
///
/// Bar types:
/// - "b": Minute bar
/// - "d": Daily bar
/// - "u": Updated bar (late trade corrections)
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "T": "b",
///   "S": "SPY",
///   "o": 388.985,
///   "h": 389.13,
///   "l": 388.975,
///   "c": 389.12,
///   "v": 49378,
///   "n": 461,
///   "vw": 389.062639,
///   "t": "2021-02-22T19:15:00Z"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBarMessage {
    /// Message type: "b", "d" or "u"
    #[serde(rename = "T")]
    pub msg_type: String,

    /// Ticker symbol
    #[serde(rename = "S")]
    pub symbol: String,

    /// Open price
    #[serde(rename = "o")]
    pub open: Decimal,

    /// High price
    #[serde(rename = "h")]
    pub high: Decimal,

    /// Low price
    #[serde(rename = "l")]
    pub low: Decimal,

    /// Close price
    #[serde(rename = "c")]
    pub close: Decimal,

    /// Volume (shares)
    #[serde(rename = "v")]
    pub volume: u64,

    /// Number of trades in bar
    #[serde(rename = "n", default)]
    pub trade_count: u64,

    /// Volume-weighted average price
    #[serde(rename = "vw", default)]
    pub vwap: Option<Decimal>,

    /// Bar start time
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
}

impl From<StockBarMessage> for Bar {
    fn from(msg: StockBarMessage) -> Self {
        Self {
            symbol: msg.symbol,
            time: msg.timestamp,
            open: msg.open,
            high: msg.high,
            low: msg.low,
            close: msg.close,
            volume: msg.volume,
        }
    }
}

// =============================================================================
// Outbound Messages (Client -> Server)
// =============================================================================

/// Authentication request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthRequest {
    /// Action: "auth"
    pub action: &'static str,

    /// API key
    pub key: String,

    /// API secret
    pub secret: String,
}

impl AuthRequest {
    /// Create a new authentication request.
    #[must_use]
    pub const fn new(key: String, secret: String) -> Self {
        Self {
            action: "auth",
            key,
            secret,
        }
    }
}

/// Bar subscription change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionRequest {
    /// Action: "subscribe" or "unsubscribe"
    pub action: &'static str,

    /// Bar symbols
    pub bars: Vec<String>,
}

impl SubscriptionRequest {
    /// Subscribe to minute bars.
    #[must_use]
    pub const fn subscribe_bars(symbols: Vec<String>) -> Self {
        Self {
            action: "subscribe",
            bars: symbols,
        }
    }

    /// Unsubscribe from minute bars.
    #[must_use]
    pub const fn unsubscribe_bars(symbols: Vec<String>) -> Self {
        Self {
            action: "unsubscribe",
            bars: symbols,
        }
    }
}

// =============================================================================
// Unified Incoming Message Enum
// =============================================================================

/// Any frame element the stock stream sends that this gateway understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamMessage {
    /// Connection/authentication success
    Success(SuccessMessage),

    /// Error message
    Error(ErrorMessage),

    /// Subscription confirmation
    Subscription(SubscriptionMessage),

    /// Minute, daily or updated bar
    Bar(StockBarMessage),
}
