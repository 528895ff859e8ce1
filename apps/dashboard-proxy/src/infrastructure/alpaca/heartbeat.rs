//! Heartbeat
//!
//! Keeps the stock stream honest with periodic WebSocket pings. Any inbound
//! frame counts as proof of life; if nothing arrives within the pong timeout
//! after a ping, the session is declared dead and the reconnect loop takes
//! over.

use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Configuration for heartbeat behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between pings.
    pub ping_interval: Duration,
    /// Silence allowed after a ping before the session is considered dead.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(20),
            pong_timeout: Duration::from_secs(20),
        }
    }
}

/// What the session loop should do on a heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Send a ping frame.
    SendPing,
    /// No sign of life since the last ping; drop the session.
    TimedOut(Duration),
}

/// Per-session heartbeat timer.
///
/// Poll [`tick`](Self::tick) from the session's `select!` loop and call
/// [`record_activity`](Self::record_activity) on every inbound frame.
#[derive(Debug)]
pub struct Heartbeat {
    config: HeartbeatConfig,
    interval: Interval,
    ping_sent_at: Option<Instant>,
}

impl Heartbeat {
    /// Start a heartbeat. The first ping goes out one interval from now.
    #[must_use]
    pub fn new(config: HeartbeatConfig) -> Self {
        let period = config.ping_interval.max(Duration::from_millis(1));
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Self {
            config,
            interval,
            ping_sent_at: None,
        }
    }

    /// Wait for the next tick and decide what to do.
    pub async fn tick(&mut self) -> HeartbeatAction {
        self.interval.tick().await;

        if let Some(sent_at) = self.ping_sent_at {
            let silent_for = sent_at.elapsed();
            if silent_for > self.config.pong_timeout {
                return HeartbeatAction::TimedOut(silent_for);
            }
        } else {
            self.ping_sent_at = Some(Instant::now());
        }

        HeartbeatAction::SendPing
    }

    /// Record any inbound frame (pong, data or control).
    pub fn record_activity(&mut self) {
        self.ping_sent_at = None;
    }
}
