//! Shared fakes for integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use dashboard_proxy::application::ports::{
    BarsQuery, MarketDataError, MarketDataPort, OptionsQuery, StreamConnection, StreamConnector,
    StreamError, StreamEvent,
};
use dashboard_proxy::domain::streaming::{
    Bar, Greeks, OptionQuote, OptionSnapshot, OptionsChain, Quote,
};
use dashboard_proxy::{ServerMessage, StreamManager};

// =============================================================================
// Upstream Stream Fake
// =============================================================================

/// Upstream call observed by the fake connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect,
    Subscribe(String),
    Unsubscribe(String),
    Shutdown,
}

/// Shared record of everything the manager asked the upstream to do.
#[derive(Default)]
pub struct StreamLog {
    calls: Mutex<Vec<Call>>,
    opened: Mutex<usize>,
    events: Mutex<Option<mpsc::Sender<StreamEvent>>>,
    fail_connect: Mutex<bool>,
    fail_unsubscribe: Mutex<bool>,
}

impl StreamLog {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn opened(&self) -> usize {
        *self.opened.lock()
    }

    pub fn fail_connect(&self) {
        *self.fail_connect.lock() = true;
    }

    pub fn fail_unsubscribe(&self) {
        *self.fail_unsubscribe.lock() = true;
    }

    /// Sender the manager listens on, once a connection was opened.
    pub fn events(&self) -> mpsc::Sender<StreamEvent> {
        self.events.lock().clone().expect("no connection opened")
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

struct FakeConnection {
    log: Arc<StreamLog>,
}

#[async_trait]
impl StreamConnection for FakeConnection {
    async fn connect(&self) -> Result<(), StreamError> {
        self.log.record(Call::Connect);
        if *self.log.fail_connect.lock() {
            return Err(StreamError::ConnectionFailed("refused".to_string()));
        }
        Ok(())
    }

    async fn subscribe_for_bars(&self, symbols: &[String]) -> Result<(), StreamError> {
        for symbol in symbols {
            self.log.record(Call::Subscribe(symbol.clone()));
        }
        Ok(())
    }

    async fn unsubscribe_from_bars(&self, symbols: &[String]) -> Result<(), StreamError> {
        for symbol in symbols {
            self.log.record(Call::Unsubscribe(symbol.clone()));
        }
        if *self.log.fail_unsubscribe.lock() {
            return Err(StreamError::CommandFailed("socket busy".to_string()));
        }
        Ok(())
    }

    fn shutdown(&self) {
        self.log.record(Call::Shutdown);
    }
}

/// Connector handing out connections that write to one [`StreamLog`].
pub struct FakeConnector {
    pub log: Arc<StreamLog>,
}

impl StreamConnector for FakeConnector {
    fn open(&self, events: mpsc::Sender<StreamEvent>) -> Arc<dyn StreamConnection> {
        *self.log.opened.lock() += 1;
        *self.log.events.lock() = Some(events);
        Arc::new(FakeConnection {
            log: Arc::clone(&self.log),
        })
    }
}

// =============================================================================
// Market Data Fake
// =============================================================================

/// REST source with canned data.
#[derive(Default)]
pub struct FakeMarketData {
    pub options_requests: Mutex<Vec<OptionsQuery>>,
    pub bars_requests: Mutex<Vec<BarsQuery>>,
    pub fail_with: Mutex<Option<MarketDataError>>,
}

impl FakeMarketData {
    pub fn failing(error: MarketDataError) -> Self {
        Self {
            fail_with: Mutex::new(Some(error)),
            ..Self::default()
        }
    }

    pub fn options_fetches(&self) -> usize {
        self.options_requests.lock().len()
    }

    fn check(&self) -> Result<(), MarketDataError> {
        self.fail_with.lock().clone().map_or(Ok(()), Err)
    }
}

#[async_trait]
impl MarketDataPort for FakeMarketData {
    async fn get_bars(&self, query: &BarsQuery) -> Result<Vec<Bar>, MarketDataError> {
        self.bars_requests.lock().push(query.clone());
        self.check()?;
        Ok(vec![bar(&query.symbol, 10)])
    }

    async fn get_latest_quote(&self, symbol: &str) -> Result<Quote, MarketDataError> {
        self.check()?;
        Ok(Quote {
            symbol: symbol.to_string(),
            time: Utc.with_ymd_and_hms(2024, 3, 1, 15, 0, 0).unwrap(),
            bid_price: Decimal::new(17950, 2),
            bid_size: 3,
            ask_price: Decimal::new(17975, 2),
            ask_size: 5,
        })
    }

    async fn get_options_snapshots(
        &self,
        query: &OptionsQuery,
    ) -> Result<OptionsChain, MarketDataError> {
        self.options_requests.lock().push(query.clone());
        self.check()?;
        let mut chain = BTreeMap::new();
        chain.insert(format!("{}240315C00172500", query.underlying), snapshot());
        Ok(chain)
    }

    async fn get_option_snapshot(
        &self,
        contract_symbol: &str,
    ) -> Result<OptionSnapshot, MarketDataError> {
        self.check()?;
        if contract_symbol.ends_with("C00172500") {
            Ok(snapshot())
        } else {
            Err(MarketDataError::NotFound(contract_symbol.to_string()))
        }
    }
}

// =============================================================================
// Builders
// =============================================================================

pub fn bar(symbol: &str, minute: u32) -> Bar {
    Bar {
        symbol: symbol.to_string(),
        time: Utc.with_ymd_and_hms(2024, 3, 1, 14, minute, 0).unwrap(),
        open: Decimal::new(17955, 2),
        high: Decimal::new(18010, 2),
        low: Decimal::new(17940, 2),
        close: Decimal::new(17998, 2),
        volume: 120_345,
    }
}

pub fn snapshot() -> OptionSnapshot {
    OptionSnapshot {
        quote: Some(OptionQuote {
            bid_price: Decimal::new(250, 2),
            bid_size: 10,
            ask_price: Decimal::new(275, 2),
            ask_size: 12,
            bid_exchange: None,
            ask_exchange: None,
            time: None,
        }),
        trade: None,
        open_interest: Some(1500),
        implied_volatility: Some(0.25),
        greeks: Some(Greeks {
            delta: 0.5,
            gamma: 0.0625,
            theta: -0.125,
            vega: 0.25,
            rho: None,
        }),
    }
}

/// Manager wired to fresh fakes.
pub fn manager() -> (Arc<StreamManager>, Arc<StreamLog>, Arc<FakeMarketData>) {
    manager_with(FakeMarketData::default())
}

pub fn manager_with(
    market_data: FakeMarketData,
) -> (Arc<StreamManager>, Arc<StreamLog>, Arc<FakeMarketData>) {
    let log = Arc::new(StreamLog::default());
    let market_data = Arc::new(market_data);
    let manager = Arc::new(StreamManager::new(
        Arc::new(FakeConnector {
            log: Arc::clone(&log),
        }),
        Arc::clone(&market_data) as Arc<dyn MarketDataPort>,
    ));
    (manager, log, market_data)
}

/// Everything queued for a client so far.
pub fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message);
    }
    out
}
