//! Gateway Configuration Settings
//!
//! Configuration types for the dashboard gateway, read once at startup from
//! environment variables.

use std::time::Duration;

use crate::infrastructure::alpaca::{
    AlpacaRestConfig, AlpacaStreamConfig, Credentials, DEFAULT_DATA_URL, DEFAULT_STREAM_URL,
    HeartbeatConfig, OptionsFeed, ReconnectConfig, RetryConfig, StockFeed,
};
use crate::infrastructure::http::DEFAULT_CLIENT_QUEUE_CAPACITY;

/// Default HTTP + WebSocket port.
pub const DEFAULT_PORT: u16 = 3001;

/// Upstream stream connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Silence after a ping before the session is considered dead.
    pub heartbeat_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(20),
            heartbeat_timeout: Duration::from_secs(20),
            reconnect_delay_initial: Duration::from_millis(1000),
            reconnect_delay_max: Duration::from_secs(60),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0, // Unlimited
        }
    }
}

/// Upstream REST settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestSettings {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Attempts per request, including the first.
    pub max_attempts: u32,
    /// Page cap per options chain side.
    pub max_option_pages: u32,
}

impl Default for RestSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            max_option_pages: 10,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// HTTP + WebSocket port.
    pub port: u16,
    /// Outbound queue capacity per browser socket.
    pub client_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            client_queue_capacity: DEFAULT_CLIENT_QUEUE_CAPACITY,
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// API credentials.
    pub credentials: Credentials,
    /// Paper account (selects the options feed).
    pub paper: bool,
    /// Stock data feed.
    pub feed: StockFeed,
    /// Market data REST base URL.
    pub data_url: String,
    /// Stock stream base URL; the feed name is appended.
    pub stream_url: String,
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Upstream stream settings.
    pub stream: StreamSettings,
    /// Upstream REST settings.
    pub rest: RestSettings,
}

impl DashboardConfig {
    /// Create configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or empty, or the
    /// port is not a valid number.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = required(&lookup, "ALPACA_KEY")?;
        let api_secret = required(&lookup, "ALPACA_SECRET")?;

        let paper = lookup("ALPACA_PAPER").is_none_or(|v| parse_bool(&v).unwrap_or(true));

        let feed = lookup("ALPACA_FEED")
            .map(|s| StockFeed::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let data_url = lookup("ALPACA_DATA_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATA_URL.to_string());

        let stream_url = lookup("ALPACA_STREAM_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_STREAM_URL.to_string());

        let port = match lookup("DASHBOARD_PORT") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "DASHBOARD_PORT".to_string(),
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let server = ServerSettings {
            port,
            client_queue_capacity: parse_or(
                &lookup,
                "DASHBOARD_CLIENT_QUEUE_CAPACITY",
                ServerSettings::default().client_queue_capacity,
            ),
        };

        let defaults = StreamSettings::default();
        let stream = StreamSettings {
            heartbeat_interval: parse_duration_secs(
                &lookup,
                "DASHBOARD_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval,
            ),
            heartbeat_timeout: parse_duration_secs(
                &lookup,
                "DASHBOARD_HEARTBEAT_TIMEOUT_SECS",
                defaults.heartbeat_timeout,
            ),
            reconnect_delay_initial: parse_duration_millis(
                &lookup,
                "DASHBOARD_RECONNECT_DELAY_INITIAL_MS",
                defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_duration_secs(
                &lookup,
                "DASHBOARD_RECONNECT_DELAY_MAX_SECS",
                defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_or(
                &lookup,
                "DASHBOARD_RECONNECT_DELAY_MULTIPLIER",
                defaults.reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: parse_or(
                &lookup,
                "DASHBOARD_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
        };

        let rest_defaults = RestSettings::default();
        let rest = RestSettings {
            timeout: parse_duration_secs(&lookup, "DASHBOARD_REST_TIMEOUT_SECS", rest_defaults.timeout),
            max_attempts: parse_or(
                &lookup,
                "DASHBOARD_REST_MAX_ATTEMPTS",
                rest_defaults.max_attempts,
            ),
            max_option_pages: parse_or(
                &lookup,
                "DASHBOARD_OPTIONS_MAX_PAGES",
                rest_defaults.max_option_pages,
            ),
        };

        Ok(Self {
            credentials: Credentials::new(api_key, api_secret),
            paper,
            feed,
            data_url,
            stream_url,
            server,
            stream,
            rest,
        })
    }

    /// Options feed matching the account type.
    #[must_use]
    pub const fn options_feed(&self) -> OptionsFeed {
        OptionsFeed::for_paper(self.paper)
    }

    /// Full stock stream URL including the feed.
    ///
    /// Market data streams use the same URL for paper and live accounts.
    #[must_use]
    pub fn stock_stream_url(&self) -> String {
        format!(
            "{}/{}",
            self.stream_url.trim_end_matches('/'),
            self.feed.as_str()
        )
    }

    /// REST client configuration.
    #[must_use]
    pub fn rest_config(&self) -> AlpacaRestConfig {
        AlpacaRestConfig {
            stock_feed: self.feed,
            options_feed: self.options_feed(),
            timeout: self.rest.timeout,
            retry: RetryConfig {
                max_attempts: self.rest.max_attempts.max(1),
                ..RetryConfig::default()
            },
            max_option_pages: self.rest.max_option_pages.max(1),
            ..AlpacaRestConfig::new(self.credentials.clone(), self.data_url.clone())
        }
    }

    /// Stock stream client configuration.
    #[must_use]
    pub fn stream_config(&self) -> AlpacaStreamConfig {
        AlpacaStreamConfig {
            reconnect: ReconnectConfig {
                initial_delay: self.stream.reconnect_delay_initial,
                max_delay: self.stream.reconnect_delay_max,
                multiplier: self.stream.reconnect_delay_multiplier,
                max_attempts: self.stream.max_reconnect_attempts,
                ..ReconnectConfig::default()
            },
            heartbeat: HeartbeatConfig {
                ping_interval: self.stream.heartbeat_interval,
                pong_timeout: self.stream.heartbeat_timeout,
            },
            ..AlpacaStreamConfig::new(self.stock_stream_url(), self.credentials.clone())
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
    if value.trim().is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(value)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
