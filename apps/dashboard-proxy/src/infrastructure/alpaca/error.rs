//! Alpaca REST error types.

use thiserror::Error;

use crate::application::ports::MarketDataError;

/// Errors from the Alpaca REST adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AlpacaError {
    /// Request could not be built or sent.
    #[error("HTTP error: {0}")]
    Http(String),

    /// API returned an error status this adapter does not map specifically.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Key or secret rejected (401/403).
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Symbol or contract unknown upstream.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited and out of retries.
    #[error("Rate limited")]
    RateLimited {
        /// Suggested retry delay in seconds, when the API sent one.
        retry_after_secs: Option<u64>,
    },

    /// Request parameters rejected (400/422).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Network error (retryable).
    #[error("Network error: {0}")]
    Network(String),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    JsonParse(String),

    /// Max retries exceeded.
    #[error("Max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// Description of the final failure.
        last_error: String,
    },
}

impl From<serde_json::Error> for AlpacaError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonParse(err.to_string())
    }
}

impl From<reqwest::Error> for AlpacaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::Http(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<AlpacaError> for MarketDataError {
    fn from(err: AlpacaError) -> Self {
        match err {
            AlpacaError::AuthenticationFailed(msg) => Self::Unauthorized(msg),
            AlpacaError::NotFound(what) => Self::NotFound(what),
            AlpacaError::RateLimited { retry_after_secs } => Self::RateLimited { retry_after_secs },
            AlpacaError::InvalidRequest(msg) => Self::InvalidRequest(msg),
            AlpacaError::Api { status, message } => Self::Upstream { status, message },
            AlpacaError::Http(msg) | AlpacaError::Network(msg) => Self::Network(msg),
            AlpacaError::JsonParse(msg) => Self::Decode(msg),
            AlpacaError::MaxRetriesExceeded {
                attempts,
                last_error,
            } => Self::Network(format!("gave up after {attempts} attempts: {last_error}")),
        }
    }
}
