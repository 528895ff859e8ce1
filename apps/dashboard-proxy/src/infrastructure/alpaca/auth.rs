//! Stock Stream Authentication
//!
//! The stock data stream must be authenticated within 10 seconds of the
//! socket opening or the server drops the connection.
//!
//! # Flow
//!
//! 1. Connect to the WebSocket endpoint
//! 2. Receive `[{"T":"success","msg":"connected"}]`
//! 3. Send `{"action":"auth","key":"...","secret":"..."}`
//! 4. Receive `[{"T":"success","msg":"authenticated"}]` or `[{"T":"error",...}]`
//!
//! # Error Codes
//!
//! - 401: Not authenticated
//! - 402: Authentication failed (invalid credentials)
//! - 403: Already authenticated
//! - 404: Authentication timeout
//! - 406: Connection limit exceeded

use std::time::Duration;

use thiserror::Error;

use super::messages::{AuthRequest, ErrorMessage, SuccessKind, SuccessMessage};
use crate::domain::stream_state::StreamFault;

/// Time budget for completing the handshake, inside the server's 10 seconds.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(8);

// =============================================================================
// Error Types
// =============================================================================

/// Handshake failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Subscribed before authenticating.
    #[error("not authenticated")]
    NotAuthenticated,

    /// Key or secret rejected.
    #[error("authentication failed: invalid API key or secret")]
    InvalidCredentials,

    /// Auth sent twice on one connection.
    #[error("already authenticated")]
    AlreadyAuthenticated,

    /// Handshake took too long.
    #[error("authentication timeout")]
    Timeout,

    /// Account already has the maximum number of stream connections.
    #[error("connection limit exceeded")]
    ConnectionLimitExceeded,

    /// Frame did not fit the handshake.
    #[error("unexpected handshake message: {0}")]
    UnexpectedMessage(String),

    /// Any other server error.
    #[error("server error ({code}): {message}")]
    ServerError {
        /// Error code from server.
        code: i32,
        /// Error message from server.
        message: String,
    },
}

impl AuthError {
    /// Upstream error code this failure corresponds to.
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        match self {
            Self::NotAuthenticated => Some(401),
            Self::InvalidCredentials => Some(402),
            Self::AlreadyAuthenticated => Some(403),
            Self::Timeout => Some(404),
            Self::ConnectionLimitExceeded => Some(406),
            Self::ServerError { code, .. } => Some(*code),
            Self::UnexpectedMessage(_) => None,
        }
    }

    /// Convert into a fault for the stream manager.
    #[must_use]
    pub fn to_fault(&self) -> StreamFault {
        StreamFault {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

impl From<&ErrorMessage> for AuthError {
    fn from(err: &ErrorMessage) -> Self {
        match err.code {
            401 => Self::NotAuthenticated,
            402 => Self::InvalidCredentials,
            403 => Self::AlreadyAuthenticated,
            404 => Self::Timeout,
            406 => Self::ConnectionLimitExceeded,
            code => Self::ServerError {
                code,
                message: err.msg.clone(),
            },
        }
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// API key pair.
///
/// `Debug` redacts the secret so credentials can appear in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    key: String,
    secret: String,
}

impl Credentials {
    /// Create credentials. Emptiness is checked by the config layer.
    #[must_use]
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }

    /// API key id.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// API secret.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Stream authentication frame.
    #[must_use]
    pub fn to_auth_request(&self) -> AuthRequest {
        AuthRequest::new(self.key.clone(), self.secret.clone())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key", &self.key)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Handshake State
// =============================================================================

/// Where a connection is in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// Socket not open.
    #[default]
    Disconnected,
    /// Server greeted us; auth not yet sent.
    Connected,
    /// Auth sent, awaiting the verdict.
    Authenticating,
    /// Server accepted the credentials.
    Authenticated,
    /// Server rejected the credentials.
    Failed,
}

/// Outcome of feeding a handshake frame to [`AuthHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeStep {
    /// Server greeted us; send this auth frame.
    SendAuth(AuthRequest),
    /// Handshake complete.
    Authenticated,
    /// Notice with no effect on the handshake.
    Ignored,
}

/// Handshake state machine for one connection.
#[derive(Debug)]
pub struct AuthHandler {
    credentials: Credentials,
    state: AuthState,
}

impl AuthHandler {
    /// Create a handler for a fresh connection.
    #[must_use]
    pub const fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            state: AuthState::Disconnected,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// Process a success frame.
    pub fn on_success(&mut self, msg: &SuccessMessage) -> HandshakeStep {
        match msg.msg {
            SuccessKind::Connected => {
                self.state = AuthState::Authenticating;
                HandshakeStep::SendAuth(self.credentials.to_auth_request())
            }
            SuccessKind::Authenticated => {
                self.state = AuthState::Authenticated;
                HandshakeStep::Authenticated
            }
            SuccessKind::Unknown => HandshakeStep::Ignored,
        }
    }

    /// Process an error frame.
    pub fn on_error(&mut self, msg: &ErrorMessage) -> AuthError {
        self.state = AuthState::Failed;
        AuthError::from(msg)
    }
}
