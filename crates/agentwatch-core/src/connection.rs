//! Connection state and reconnect policy.
//!
//! The push channel surfaces its lifecycle to consumers as
//! [`ConnectionState`] transitions, and [`ReconnectPolicy`] decides — from
//! the close cause, the attempt count, and the session's shape — whether
//! and when to try again.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session ids with this prefix exist only on the client; the backend has
/// no record of them and the push channel must stay silent.
pub const TEMP_SESSION_PREFIX: &str = "temp-";

/// Whether a session id names a client-only placeholder session.
#[must_use]
pub fn is_temp_session(session_id: &str) -> bool {
    session_id.starts_with(TEMP_SESSION_PREFIX)
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection state
// ─────────────────────────────────────────────────────────────────────────────

/// Observable lifecycle of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No channel; either never started or closed without a pending retry.
    #[default]
    Disconnected,
    /// A connect attempt (or scheduled retry) is in flight.
    Connecting,
    /// The channel is open and delivering events.
    Connected,
    /// The retry budget is exhausted; only a manual retry resumes.
    PermanentlyFailed,
}

/// Connection state plus retry bookkeeping, as stored for consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConnectionInfo {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Consecutive failed attempts since the last successful open.
    pub attempt_count: u32,
    /// When the next automatic retry fires, if one is scheduled.
    pub next_retry_at: Option<DateTime<Utc>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Close causes
// ─────────────────────────────────────────────────────────────────────────────

/// Why the push channel stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCause {
    /// Clean shutdown (close code 1000) or a locally requested close.
    Normal,
    /// The server rejected the session (close code 1008); the session may
    /// not be provisioned yet, so retries back off longer.
    SessionNotFound,
    /// Any other close code, or a close without a code.
    Abnormal(Option<u16>),
    /// The transport failed before or during the connection.
    TransportError,
}

impl CloseCause {
    /// Classify a websocket close code.
    #[must_use]
    pub fn from_close_code(code: Option<u16>) -> Self {
        match code {
            Some(1000) => Self::Normal,
            Some(1008) => Self::SessionNotFound,
            other => Self::Abnormal(other),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Reconnect policy
// ─────────────────────────────────────────────────────────────────────────────

/// What the channel manager should do after a close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Do not reconnect; settle in `Disconnected`.
    Stop,
    /// Retry budget exhausted; settle in `PermanentlyFailed`.
    GiveUp,
    /// Schedule a reconnect after the given delay.
    RetryAfter(Duration),
}

/// Cause-aware reconnect policy for the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Delay after an abnormal close or transport error.
    #[serde(default = "default_medium_delay", with = "duration_secs")]
    pub medium_delay: Duration,
    /// Delay after a session-not-found rejection.
    #[serde(default = "default_long_delay", with = "duration_secs")]
    pub long_delay: Duration,
    /// Consecutive failures tolerated before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_medium_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_long_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_max_attempts() -> u32 {
    10
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            medium_delay: default_medium_delay(),
            long_delay: default_long_delay(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl ReconnectPolicy {
    /// Decide the next step after the channel closed.
    ///
    /// `attempts` is the count of consecutive failures including the one
    /// being decided. Terminal sessions and temp sessions never reconnect.
    #[must_use]
    pub fn decide(
        &self,
        cause: CloseCause,
        attempts: u32,
        session_terminal: bool,
        temp_session: bool,
    ) -> ReconnectDecision {
        if temp_session || session_terminal {
            return ReconnectDecision::Stop;
        }
        let delay = match cause {
            CloseCause::Normal => return ReconnectDecision::Stop,
            CloseCause::SessionNotFound => self.long_delay,
            CloseCause::Abnormal(_) | CloseCause::TransportError => self.medium_delay,
        };
        if attempts > self.max_attempts {
            ReconnectDecision::GiveUp
        } else {
            ReconnectDecision::RetryAfter(delay)
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn temp_prefix_detection() {
        assert!(is_temp_session("temp-123"));
        assert!(!is_temp_session("abc-temp-123"));
        assert!(!is_temp_session("session-1"));
    }

    #[test]
    fn close_code_classification() {
        assert_eq!(CloseCause::from_close_code(Some(1000)), CloseCause::Normal);
        assert_eq!(
            CloseCause::from_close_code(Some(1008)),
            CloseCause::SessionNotFound
        );
        assert_eq!(
            CloseCause::from_close_code(Some(1006)),
            CloseCause::Abnormal(Some(1006))
        );
        assert_eq!(CloseCause::from_close_code(None), CloseCause::Abnormal(None));
    }

    #[test]
    fn normal_close_never_retries() {
        let policy = ReconnectPolicy::default();
        assert_eq!(
            policy.decide(CloseCause::Normal, 1, false, false),
            ReconnectDecision::Stop
        );
    }

    #[test]
    fn session_not_found_uses_long_delay() {
        let policy = ReconnectPolicy::default();
        assert_eq!(
            policy.decide(CloseCause::SessionNotFound, 1, false, false),
            ReconnectDecision::RetryAfter(Duration::from_secs(10))
        );
    }

    #[test]
    fn abnormal_close_uses_medium_delay() {
        let policy = ReconnectPolicy::default();
        assert_eq!(
            policy.decide(CloseCause::Abnormal(Some(1006)), 3, false, false),
            ReconnectDecision::RetryAfter(Duration::from_secs(5))
        );
        assert_eq!(
            policy.decide(CloseCause::TransportError, 3, false, false),
            ReconnectDecision::RetryAfter(Duration::from_secs(5))
        );
    }

    #[test]
    fn attempt_cap_gives_up() {
        let policy = ReconnectPolicy::default();
        assert_matches!(
            policy.decide(CloseCause::TransportError, 10, false, false),
            ReconnectDecision::RetryAfter(_)
        );
        assert_eq!(
            policy.decide(CloseCause::TransportError, 11, false, false),
            ReconnectDecision::GiveUp
        );
    }

    #[test]
    fn terminal_session_never_reconnects() {
        let policy = ReconnectPolicy::default();
        assert_eq!(
            policy.decide(CloseCause::TransportError, 1, true, false),
            ReconnectDecision::Stop
        );
    }

    #[test]
    fn temp_session_never_reconnects() {
        let policy = ReconnectPolicy::default();
        assert_eq!(
            policy.decide(CloseCause::SessionNotFound, 1, false, true),
            ReconnectDecision::Stop
        );
    }

    #[test]
    fn policy_deserializes_with_defaults() {
        let policy: ReconnectPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, ReconnectPolicy::default());
        let custom: ReconnectPolicy =
            serde_json::from_str(r#"{"medium_delay": 2, "max_attempts": 3}"#).unwrap();
        assert_eq!(custom.medium_delay, Duration::from_secs(2));
        assert_eq!(custom.long_delay, Duration::from_secs(10));
        assert_eq!(custom.max_attempts, 3);
    }
}
