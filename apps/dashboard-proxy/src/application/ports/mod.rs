//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `StreamConnector` / `StreamConnection`: the single upstream stock stream
//! - `MarketDataPort`: REST bars, quotes and option snapshots

mod market_data;
mod stream;

pub use market_data::{
    BarsQuery, DEFAULT_TIMEFRAME, MarketDataError, MarketDataPort, OptionsQuery,
};
#[cfg(test)]
pub use market_data::MockMarketDataPort;
pub use stream::{StreamConnection, StreamConnector, StreamError, StreamEvent};
