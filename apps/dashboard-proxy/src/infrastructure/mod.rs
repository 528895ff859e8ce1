//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer, plus the HTTP surface.

/// Alpaca REST and stock stream adapters.
pub mod alpaca;

/// Configuration and dependency injection.
pub mod config;

/// Health and metrics HTTP handlers.
pub mod health;

/// HTTP + WebSocket server for the dashboard.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
