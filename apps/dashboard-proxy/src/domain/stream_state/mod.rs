//! Upstream Stream State Machine
//!
//! Pure bookkeeping for the single shared upstream stream: whether it is
//! usable, whether it is still allowed, and how many authentication
//! failures have been seen.
//!
//! # Lifecycle
//!
//! ```text
//! Uninitialized ──initialize──▶ Connecting ──authenticated──▶ Authenticated
//!                                                  ▲               │
//!                                                  └─authenticated─┤ error / drop
//!                                                                  ▼
//!                                                               Degraded
//!
//! any phase ──3rd auth failure──▶ Disabled (terminal)
//! ```
//!
//! Reconnection is the upstream client's business; this machine only records
//! what it reports.

use serde::Serialize;

/// Cumulative authentication failures that permanently disable streaming.
pub const AUTH_FAILURE_THRESHOLD: u32 = 3;

// =============================================================================
// Events
// =============================================================================

/// Connection state reported by the upstream stream client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Opening the socket.
    Connecting,
    /// Socket open, not yet authenticated.
    Connected,
    /// Authenticated and able to subscribe.
    Authenticated,
    /// Socket closed.
    Disconnected,
}

impl ConnectionState {
    /// Lowercase label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Authenticated => "authenticated",
            Self::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by the upstream stream client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFault {
    /// Upstream error code, when the upstream sent one.
    pub code: Option<i32>,
    /// Error text.
    pub message: String,
}

impl StreamFault {
    /// Create a fault with an upstream error code.
    #[must_use]
    pub fn with_code(code: i32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    /// Create a fault without an error code (transport errors).
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Whether this fault indicates rejected credentials.
    ///
    /// Upstream codes 401-404 (not authenticated, auth failed, already
    /// authenticated, auth timeout) count, as does any message mentioning
    /// authentication.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.code, Some(401..=404))
            || self.message.to_ascii_lowercase().contains("auth")
    }
}

impl std::fmt::Display for StreamFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{code}] {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

// =============================================================================
// Phase and Status
// =============================================================================

/// Coarse lifecycle phase of the upstream stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamPhase {
    /// `initialize` has not run.
    Uninitialized,
    /// Connection attempt in flight.
    Connecting,
    /// Authenticated and usable.
    Authenticated,
    /// Initialized but not currently usable.
    Degraded,
    /// Permanently disabled after repeated auth failures.
    Disabled,
}

impl StreamPhase {
    /// Lowercase label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Connecting => "connecting",
            Self::Authenticated => "authenticated",
            Self::Degraded => "degraded",
            Self::Disabled => "disabled",
        }
    }
}

/// Snapshot of stream usability, as exposed on the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamStatus {
    /// Upstream stream is authenticated and usable.
    pub connected: bool,
    /// Streaming has not been permanently disabled.
    pub enabled: bool,
}

/// Observable effect of feeding an event into [`StreamState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing externally visible changed.
    Unchanged,
    /// Stream became usable.
    Connected,
    /// Stream stopped being usable but remains enabled.
    Degraded,
    /// Stream was permanently disabled by this event.
    Disabled,
}

// =============================================================================
// State
// =============================================================================

/// Stream bookkeeping owned by the stream manager.
#[derive(Debug, Clone)]
pub struct StreamState {
    initialized: bool,
    connected: bool,
    enabled: bool,
    degraded: bool,
    auth_error_count: u32,
}

impl Default for StreamState {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamState {
    /// Fresh, enabled, never-initialized state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            initialized: false,
            connected: false,
            enabled: true,
            degraded: false,
            auth_error_count: 0,
        }
    }

    /// Whether the stream is authenticated and usable.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether streaming is still allowed.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Cumulative authentication failures since the last successful auth.
    #[must_use]
    pub const fn auth_error_count(&self) -> u32 {
        self.auth_error_count
    }

    /// Current `{connected, enabled}` pair.
    #[must_use]
    pub const fn status(&self) -> StreamStatus {
        StreamStatus {
            connected: self.connected,
            enabled: self.enabled,
        }
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> StreamPhase {
        if !self.enabled {
            StreamPhase::Disabled
        } else if !self.initialized {
            StreamPhase::Uninitialized
        } else if self.connected {
            StreamPhase::Authenticated
        } else if self.degraded {
            StreamPhase::Degraded
        } else {
            StreamPhase::Connecting
        }
    }

    /// Record that a connection attempt is starting.
    ///
    /// Returns `false` when streaming is disabled and no attempt may be made.
    pub const fn begin_connecting(&mut self) -> bool {
        if !self.enabled {
            return false;
        }
        self.initialized = true;
        true
    }

    /// Apply a connection state change.
    pub fn on_state_change(&mut self, state: ConnectionState) -> Transition {
        if !self.enabled {
            return Transition::Unchanged;
        }

        match state {
            ConnectionState::Authenticated => {
                self.auth_error_count = 0;
                self.degraded = false;
                if self.connected {
                    Transition::Unchanged
                } else {
                    self.connected = true;
                    Transition::Connected
                }
            }
            ConnectionState::Disconnected => self.clear_connected(),
            ConnectionState::Connecting | ConnectionState::Connected => Transition::Unchanged,
        }
    }

    /// Apply an upstream error.
    ///
    /// Authentication failures count toward [`AUTH_FAILURE_THRESHOLD`]; on
    /// reaching it streaming is disabled for good. Any error clears
    /// `connected`.
    pub fn on_error(&mut self, fault: &StreamFault) -> Transition {
        if !self.enabled {
            return Transition::Unchanged;
        }

        if fault.is_auth_failure() {
            self.auth_error_count = self.auth_error_count.saturating_add(1);
            if self.auth_error_count >= AUTH_FAILURE_THRESHOLD {
                self.enabled = false;
                self.connected = false;
                return Transition::Disabled;
            }
        }

        self.clear_connected()
    }

    /// Record a failed initial connect.
    pub fn on_connect_failed(&mut self) -> Transition {
        if !self.enabled {
            return Transition::Unchanged;
        }
        self.clear_connected()
    }

    const fn clear_connected(&mut self) -> Transition {
        self.degraded = true;
        if self.connected {
            self.connected = false;
            Transition::Degraded
        } else {
            Transition::Unchanged
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
