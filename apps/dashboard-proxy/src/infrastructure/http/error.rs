//! HTTP response envelope and error mapping.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::application::ports::MarketDataError;

/// Success envelope: `{success: true, data, timestamp}`.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    /// Always `true`.
    pub success: bool,
    /// Payload.
    pub data: T,
    /// When the response was produced.
    pub timestamp: DateTime<Utc>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Wrap a payload.
    #[must_use]
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
            timestamp: Utc::now(),
        })
    }
}

/// Error body: `{success: false, error}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Always `false`.
    pub success: bool,
    /// Human-readable error.
    pub error: String,
}

/// Route failure.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Path symbol failed validation.
    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    /// Query parameter failed validation.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Upstream market data failure.
    #[error(transparent)]
    MarketData(#[from] MarketDataError),
}

impl ApiError {
    /// HTTP status for this error.
    ///
    /// Upstream auth failures are the gateway's problem, not the caller's,
    /// so they surface as 502.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidSymbol(_) | Self::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            Self::MarketData(err) => match err {
                MarketDataError::NotFound(_) => StatusCode::NOT_FOUND,
                MarketDataError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                MarketDataError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                MarketDataError::Unauthorized(_)
                | MarketDataError::Upstream { .. }
                | MarketDataError::Network(_)
                | MarketDataError::Decode(_) => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let retry_after = match &self {
            Self::MarketData(MarketDataError::RateLimited {
                retry_after_secs: Some(secs),
            }) => HeaderValue::from_str(&secs.to_string()).ok(),
            _ => None,
        };

        let body = Json(ErrorBody {
            success: false,
            error: self.to_string(),
        });

        let mut response = (status, body).into_response();
        if let Some(value) = retry_after {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response
    }
}
