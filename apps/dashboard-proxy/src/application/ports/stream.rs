//! Upstream stock stream port.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::stream_state::{ConnectionState, StreamFault};
use crate::domain::streaming::Bar;

/// Event emitted by an upstream stream connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Connection moved to a new state.
    StateChanged(ConnectionState),
    /// Upstream or transport error.
    Error(StreamFault),
    /// Bar tick for a subscribed symbol.
    Bar(Bar),
}

/// Failure issuing a command on the upstream stream.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// Initial connection or handshake failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Session is not running (never connected, or shut down).
    #[error("Stream is not running")]
    NotRunning,

    /// Command could not be delivered to the upstream.
    #[error("Command failed: {0}")]
    CommandFailed(String),
}

/// One upstream streaming connection.
///
/// Implementations report state changes, errors and bars on the event
/// channel handed to [`StreamConnector::open`], and reconnect internally
/// until [`shutdown`](Self::shutdown) is called.
#[async_trait]
pub trait StreamConnection: Send + Sync {
    /// Open the socket and authenticate.
    async fn connect(&self) -> Result<(), StreamError>;

    /// Start receiving minute bars for `symbols`.
    async fn subscribe_for_bars(&self, symbols: &[String]) -> Result<(), StreamError>;

    /// Stop receiving minute bars for `symbols`.
    async fn unsubscribe_from_bars(&self, symbols: &[String]) -> Result<(), StreamError>;

    /// Close the session and stop reconnecting.
    fn shutdown(&self);
}

/// Factory for upstream connections.
pub trait StreamConnector: Send + Sync {
    /// Create a connection that reports on `events`. Does not connect.
    fn open(&self, events: mpsc::Sender<StreamEvent>) -> Arc<dyn StreamConnection>;
}
