//! Retry configuration and backoff calculation for snapshot fetches.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry behavior for transient snapshot failures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum retry attempts before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay in milliseconds for the first retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Ceiling on the computed delay in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter as a fraction of the delay (`0.2` means ±20%).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_jitter_factor() -> f64 {
    0.2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (zero-based), with jitter.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.min(16);
        let raw = self
            .base_delay_ms
            .saturating_mul(1_u64 << exp)
            .min(self.max_delay_ms);
        if self.jitter_factor <= 0.0 {
            return Duration::from_millis(raw);
        }
        let jitter_span = (raw as f64) * self.jitter_factor;
        let jitter = rand::rng().random_range(-jitter_span..=jitter_span);
        let with_jitter = ((raw as f64) + jitter).max(0.0) as u64;
        Duration::from_millis(with_jitter.min(self.max_delay_ms))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryConfig {
        RetryConfig {
            jitter_factor: 0.0,
            ..RetryConfig::default()
        }
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let config = no_jitter();
        assert_eq!(config.backoff_delay(0), Duration::from_millis(1000));
        assert_eq!(config.backoff_delay(1), Duration::from_millis(2000));
        assert_eq!(config.backoff_delay(2), Duration::from_millis(4000));
    }

    #[test]
    fn delay_is_capped() {
        let config = no_jitter();
        assert_eq!(config.backoff_delay(10), Duration::from_millis(60_000));
        assert_eq!(config.backoff_delay(63), Duration::from_millis(60_000));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let config = RetryConfig::default();
        for attempt in 0..6 {
            let base = (1000_u64 << attempt).min(60_000) as f64;
            let delay = config.backoff_delay(attempt).as_millis() as f64;
            assert!(delay >= base * 0.8 - 1.0);
            assert!(delay <= (base * 1.2).min(60_000.0) + 1.0);
        }
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: RetryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RetryConfig::default());
        let custom: RetryConfig = serde_json::from_str(r#"{"max_retries": 2}"#).unwrap();
        assert_eq!(custom.max_retries, 2);
        assert_eq!(custom.base_delay_ms, 1000);
    }
}
