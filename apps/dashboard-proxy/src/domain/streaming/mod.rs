//! Market Data Types
//!
//! Core domain types for market data: bars, quotes, and option snapshots.
//! These types are codec-agnostic and represent the canonical shape that is
//! sent to browser clients. Prices are `Decimal` internally and serialize as
//! JSON numbers so the front end can chart them directly.

use std::collections::BTreeMap;

use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Symbols
// =============================================================================

/// Maximum accepted length of a stock ticker or OCC contract symbol.
pub const MAX_SYMBOL_LEN: usize = 32;

/// Normalize a user-supplied symbol.
///
/// Trims surrounding whitespace and upper-cases. Returns `None` for empty
/// input, input longer than [`MAX_SYMBOL_LEN`], or characters outside
/// `[A-Z0-9.-]`.
#[must_use]
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let symbol = raw.trim().to_ascii_uppercase();

    if symbol.is_empty() || symbol.len() > MAX_SYMBOL_LEN {
        return None;
    }

    symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        .then_some(symbol)
}

// =============================================================================
// Bars and Quotes
// =============================================================================

/// One OHLCV sample for a symbol.
///
/// # Wire Format (JSON)
/// ```json
/// {"symbol":"AAPL","time":"2024-03-01T14:30:00Z","open":179.55,"high":180.1,
///  "low":179.4,"close":179.98,"volume":120345}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    /// Ticker symbol.
    pub symbol: String,
    /// Bar start time.
    pub time: DateTime<Utc>,
    /// Open price.
    #[serde(with = "rust_decimal::serde::float")]
    pub open: Decimal,
    /// High price.
    #[serde(with = "rust_decimal::serde::float")]
    pub high: Decimal,
    /// Low price.
    #[serde(with = "rust_decimal::serde::float")]
    pub low: Decimal,
    /// Close price.
    #[serde(with = "rust_decimal::serde::float")]
    pub close: Decimal,
    /// Volume (shares).
    pub volume: u64,
}

/// Latest NBBO quote for a stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Ticker symbol.
    pub symbol: String,
    /// Quote time.
    pub time: DateTime<Utc>,
    /// Bid price.
    #[serde(with = "rust_decimal::serde::float")]
    pub bid_price: Decimal,
    /// Bid size.
    pub bid_size: u64,
    /// Ask price.
    #[serde(with = "rust_decimal::serde::float")]
    pub ask_price: Decimal,
    /// Ask size.
    pub ask_size: u64,
}

// =============================================================================
// Options
// =============================================================================

/// Option side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    /// Call option.
    Call,
    /// Put option.
    Put,
}

impl OptionType {
    /// Both sides, calls first.
    pub const BOTH: [Self; 2] = [Self::Call, Self::Put];

    /// Query parameter value used by the upstream API.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Put => "put",
        }
    }
}

/// Latest quote on an option contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionQuote {
    /// Bid price.
    #[serde(with = "rust_decimal::serde::float")]
    pub bid_price: Decimal,
    /// Bid size (contracts).
    pub bid_size: u64,
    /// Ask price.
    #[serde(with = "rust_decimal::serde::float")]
    pub ask_price: Decimal,
    /// Ask size (contracts).
    pub ask_size: u64,
    /// Bid exchange code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid_exchange: Option<String>,
    /// Ask exchange code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask_exchange: Option<String>,
    /// Quote time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}

/// Latest trade on an option contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionTrade {
    /// Trade price.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Trade size (contracts).
    pub size: u64,
    /// Exchange code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange: Option<String>,
    /// Trade time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
}

/// Option sensitivities as reported upstream. Never computed here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    /// Delta.
    pub delta: f64,
    /// Gamma.
    pub gamma: f64,
    /// Theta.
    pub theta: f64,
    /// Vega.
    pub vega: f64,
    /// Rho (dropped from the minimal form).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rho: Option<f64>,
}

/// Point-in-time snapshot of one option contract.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionSnapshot {
    /// Latest quote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<OptionQuote>,
    /// Latest trade.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trade: Option<OptionTrade>,
    /// Open interest, when the upstream reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_interest: Option<u64>,
    /// Implied volatility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implied_volatility: Option<f64>,
    /// Greeks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greeks: Option<Greeks>,
}

impl OptionSnapshot {
    /// Project onto the fields the options grid renders.
    ///
    /// Keeps bid/ask price and size, last trade price and size, open
    /// interest, implied volatility and delta/gamma/theta/vega.
    #[must_use]
    pub fn minimal(&self) -> Self {
        Self {
            quote: self.quote.as_ref().map(|q| OptionQuote {
                bid_price: q.bid_price,
                bid_size: q.bid_size,
                ask_price: q.ask_price,
                ask_size: q.ask_size,
                bid_exchange: None,
                ask_exchange: None,
                time: None,
            }),
            trade: self.trade.as_ref().map(|t| OptionTrade {
                price: t.price,
                size: t.size,
                exchange: None,
                time: None,
            }),
            open_interest: self.open_interest,
            implied_volatility: self.implied_volatility,
            greeks: self.greeks.map(|g| Greeks { rho: None, ..g }),
        }
    }
}

/// Option snapshots keyed by OCC contract symbol.
pub type OptionsChain = BTreeMap<String, OptionSnapshot>;

// =============================================================================
// Expiration Window
// =============================================================================

/// Expiration date range used when fetching an options chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionsWindow {
    /// Earliest expiration (inclusive).
    pub expiration_gte: NaiveDate,
    /// Latest expiration (inclusive).
    pub expiration_lte: NaiveDate,
}

impl OptionsWindow {
    /// Days between today and the first expiration shown.
    pub const LEAD_DAYS: u64 = 14;

    /// Months between today and the last expiration shown.
    pub const SPAN_MONTHS: u32 = 6;

    /// Forward-looking window: `today + 14 days` through `today + 6 months`.
    #[must_use]
    pub fn forward_from(today: NaiveDate) -> Self {
        Self {
            expiration_gte: today
                .checked_add_days(Days::new(Self::LEAD_DAYS))
                .unwrap_or(NaiveDate::MAX),
            expiration_lte: today
                .checked_add_months(Months::new(Self::SPAN_MONTHS))
                .unwrap_or(NaiveDate::MAX),
        }
    }

    /// Window anchored on the current UTC date.
    #[must_use]
    pub fn current() -> Self {
        Self::forward_from(Utc::now().date_naive())
    }
}

// =============================================================================
// Tests
// =============================================================================
