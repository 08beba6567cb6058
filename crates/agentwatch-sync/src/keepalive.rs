//! Liveness tracking for the push channel.
//!
//! The server probes the channel with `ping` events on a fixed interval.
//! [`Keepalive`] produces the paired reply and tracks probe recency; when
//! no probe (or any other traffic) arrives within `timeout_factor`
//! intervals, the channel is considered stale and torn down through the
//! abnormal-close path so the normal reconnect policy applies.

use std::time::Duration;

use agentwatch_core::time::format_wire_timestamp;
use chrono::Utc;
use tokio::time::Instant;

/// Tracks probe recency and builds liveness replies.
#[derive(Debug)]
pub struct Keepalive {
    interval: Duration,
    timeout_factor: u32,
    last_seen: Instant,
}

impl Keepalive {
    /// A tracker expecting a probe every `interval`, tolerating
    /// `timeout_factor` missed intervals.
    #[must_use]
    pub fn new(interval: Duration, timeout_factor: u32) -> Self {
        Self {
            interval,
            timeout_factor,
            last_seen: Instant::now(),
        }
    }

    /// Record that traffic arrived now.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// When the staleness watchdog should fire if nothing else arrives.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.last_seen + self.interval * self.timeout_factor.max(1)
    }

    /// The JSON reply to a `ping` event, carrying the current timestamp.
    #[must_use]
    pub fn pong_frame() -> String {
        serde_json::json!({
            "type": "pong",
            "timestamp": format_wire_timestamp(Utc::now()),
        })
        .to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
