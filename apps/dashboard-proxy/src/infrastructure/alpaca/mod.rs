//! Alpaca Adapters
//!
//! Upstream clients for Alpaca market data:
//!
//! - **REST**: historical bars, latest quotes, option snapshots
//!   ([`AlpacaRestClient`], implements `MarketDataPort`)
//! - **Stock stream**: minute bars over WebSocket with auth handshake,
//!   heartbeat and reconnect ([`AlpacaStreamClient`], implements
//!   `StreamConnection`)

pub mod api_types;
pub mod auth;
pub mod codec;
pub mod error;
pub mod heartbeat;
pub mod messages;
pub mod reconnect;
pub mod rest;
pub mod stream;

pub use auth::{AuthError, AuthHandler, AuthState, Credentials};
pub use codec::{CodecError, JsonCodec};
pub use error::AlpacaError;
pub use heartbeat::{Heartbeat, HeartbeatAction, HeartbeatConfig};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use rest::{
    AlpacaRestClient, AlpacaRestConfig, DEFAULT_DATA_URL, OptionsFeed, RetryConfig, StockFeed,
};
pub use stream::{
    AlpacaStreamClient, AlpacaStreamConfig, AlpacaStreamConnector, DEFAULT_STREAM_URL,
    StreamClientError,
};
