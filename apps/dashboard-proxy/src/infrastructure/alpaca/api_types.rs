//! Alpaca market data REST response types.
//!
//! Field names follow the API's one- and two-letter keys; conversions into
//! domain types live next to each DTO.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::streaming::{Bar, Greeks, OptionQuote, OptionSnapshot, OptionTrade, Quote};

// ============================================================================
// Stock Data Types
// ============================================================================

/// Response from `GET /v2/stocks/{symbol}/bars`.
#[derive(Debug, Deserialize)]
pub struct AlpacaBarsResponse {
    /// Bars in time order. `null` when the range is empty.
    #[serde(default)]
    pub bars: Option<Vec<AlpacaBar>>,
    /// Token for the next page, if any.
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Single OHLCV bar.
#[derive(Debug, Deserialize, Clone)]
pub struct AlpacaBar {
    /// Bar start time.
    pub t: DateTime<Utc>,
    /// Open price.
    pub o: Decimal,
    /// High price.
    pub h: Decimal,
    /// Low price.
    pub l: Decimal,
    /// Close price.
    pub c: Decimal,
    /// Volume.
    pub v: u64,
    /// Volume-weighted average price.
    #[serde(default)]
    pub vw: Option<Decimal>,
    /// Number of trades.
    #[serde(default)]
    pub n: Option<u64>,
}

impl AlpacaBar {
    /// Convert into a domain bar for `symbol`.
    #[must_use]
    pub fn into_bar(self, symbol: &str) -> Bar {
        Bar {
            symbol: symbol.to_string(),
            time: self.t,
            open: self.o,
            high: self.h,
            low: self.l,
            close: self.c,
            volume: self.v,
        }
    }
}

/// Response from `GET /v2/stocks/{symbol}/quotes/latest`.
#[derive(Debug, Deserialize)]
pub struct AlpacaLatestQuoteResponse {
    /// Ticker symbol.
    pub symbol: String,
    /// Latest quote.
    pub quote: AlpacaQuote,
}

/// Stock NBBO quote.
#[derive(Debug, Deserialize, Clone)]
pub struct AlpacaQuote {
    /// Quote time.
    pub t: DateTime<Utc>,
    /// Bid price.
    pub bp: Decimal,
    /// Bid size.
    pub bs: u64,
    /// Ask price.
    pub ap: Decimal,
    /// Ask size.
    #[serde(rename = "as")]
    pub ask_size: u64,
}

impl From<AlpacaLatestQuoteResponse> for Quote {
    fn from(response: AlpacaLatestQuoteResponse) -> Self {
        let q = response.quote;
        Self {
            symbol: response.symbol,
            time: q.t,
            bid_price: q.bp,
            bid_size: q.bs,
            ask_price: q.ap,
            ask_size: q.ask_size,
        }
    }
}

// ============================================================================
// Options Data Types
// ============================================================================

/// Response from the option snapshot endpoints.
#[derive(Debug, Deserialize)]
pub struct AlpacaOptionSnapshotsResponse {
    /// Map of OCC contract symbol to snapshot.
    #[serde(default)]
    pub snapshots: HashMap<String, AlpacaOptionSnapshot>,
    /// Token for the next page, if any.
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Single option snapshot.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct AlpacaOptionSnapshot {
    /// Latest quote.
    #[serde(default)]
    pub latest_quote: Option<AlpacaOptionQuote>,
    /// Latest trade.
    #[serde(default)]
    pub latest_trade: Option<AlpacaOptionTrade>,
    /// Greeks.
    #[serde(default)]
    pub greeks: Option<AlpacaOptionGreeks>,
    /// Implied volatility.
    #[serde(default)]
    pub implied_volatility: Option<f64>,
    /// Open interest (only on some feeds).
    #[serde(default)]
    pub open_interest: Option<u64>,
}

/// Option quote.
#[derive(Debug, Deserialize, Clone)]
pub struct AlpacaOptionQuote {
    /// Quote time.
    #[serde(default)]
    pub t: Option<DateTime<Utc>>,
    /// Ask price.
    pub ap: Decimal,
    /// Ask size.
    #[serde(rename = "as")]
    pub ask_size: u64,
    /// Bid price.
    pub bp: Decimal,
    /// Bid size.
    pub bs: u64,
    /// Ask exchange.
    #[serde(default)]
    pub ax: Option<String>,
    /// Bid exchange.
    #[serde(default)]
    pub bx: Option<String>,
}

/// Option trade.
#[derive(Debug, Deserialize, Clone)]
pub struct AlpacaOptionTrade {
    /// Trade time.
    #[serde(default)]
    pub t: Option<DateTime<Utc>>,
    /// Price.
    pub p: Decimal,
    /// Size.
    pub s: u64,
    /// Exchange.
    #[serde(default)]
    pub x: Option<String>,
}

/// Option Greeks. Any field may be missing for illiquid contracts.
#[derive(Debug, Deserialize, Clone, Copy, Default)]
pub struct AlpacaOptionGreeks {
    /// Delta.
    #[serde(default)]
    pub delta: Option<f64>,
    /// Gamma.
    #[serde(default)]
    pub gamma: Option<f64>,
    /// Theta.
    #[serde(default)]
    pub theta: Option<f64>,
    /// Vega.
    #[serde(default)]
    pub vega: Option<f64>,
    /// Rho.
    #[serde(default)]
    pub rho: Option<f64>,
}

impl AlpacaOptionGreeks {
    /// Domain Greeks, present only when all four first-order values are.
    #[must_use]
    pub fn to_greeks(self) -> Option<Greeks> {
        Some(Greeks {
            delta: self.delta?,
            gamma: self.gamma?,
            theta: self.theta?,
            vega: self.vega?,
            rho: self.rho,
        })
    }
}

impl From<AlpacaOptionSnapshot> for OptionSnapshot {
    fn from(snapshot: AlpacaOptionSnapshot) -> Self {
        Self {
            quote: snapshot.latest_quote.map(|q| OptionQuote {
                bid_price: q.bp,
                bid_size: q.bs,
                ask_price: q.ap,
                ask_size: q.ask_size,
                bid_exchange: q.bx,
                ask_exchange: q.ax,
                time: q.t,
            }),
            trade: snapshot.latest_trade.map(|t| OptionTrade {
                price: t.p,
                size: t.s,
                exchange: t.x,
                time: t.t,
            }),
            open_interest: snapshot.open_interest,
            implied_volatility: snapshot.implied_volatility,
            greeks: snapshot.greeks.and_then(AlpacaOptionGreeks::to_greeks),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Error body returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaErrorResponse {
    /// Numeric error code.
    #[serde(default)]
    pub code: Option<i64>,
    /// Error message.
    pub message: String,
}
