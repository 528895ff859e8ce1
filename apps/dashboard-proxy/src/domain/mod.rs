//! Domain Layer - Core market data types and stream lifecycle rules.
//!
//! This layer contains the core domain types for the dashboard gateway
//! with no I/O. All types here are pure Rust with serialization support.

/// Market data value types (bars, quotes, option snapshots).
pub mod streaming;

/// Browser WebSocket wire protocol.
pub mod protocol;

/// Upstream stream connection state machine.
pub mod stream_state;

/// Per-symbol routing of bar ticks to browser clients.
pub mod subscription;
