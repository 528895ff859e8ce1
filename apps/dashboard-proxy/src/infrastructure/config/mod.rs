//! Configuration Module
//!
//! Environment-driven configuration for the gateway and the upstream
//! clients it builds.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_PORT, DashboardConfig, RestSettings, ServerSettings, StreamSettings,
};
