//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for the upstream stream and REST market data.
pub mod ports;

/// Application services for stream management and client sessions.
pub mod services;
