//! Monitor configuration.

use std::time::Duration;

use agentwatch_core::activity::DEFAULT_ACTIVITY_CAP;
use agentwatch_core::connection::ReconnectPolicy;
use agentwatch_core::retry::RetryConfig;
use serde::{Deserialize, Serialize};

/// Tunables for a [`crate::SessionMonitor`].
///
/// Deserializable so a config file or environment layer can override any
/// subset; every field has a default matching the remote backend's local
/// development setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// HTTP base of the analysis backend.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Websocket base; derived from `base_url` when unset.
    #[serde(default)]
    pub ws_url: Option<String>,

    /// Delay between bootstrap and the first connect attempt, in
    /// milliseconds.
    #[serde(default = "default_connect_grace_ms")]
    pub connect_grace_ms: u64,

    /// Fixed delay between snapshot retries while the session returns 404,
    /// in milliseconds.
    #[serde(default = "default_provisioning_delay_ms")]
    pub provisioning_delay_ms: u64,

    /// Reconnect behavior of the push channel.
    #[serde(default)]
    pub reconnect: ReconnectPolicy,

    /// Backoff for transient snapshot failures.
    #[serde(default)]
    pub snapshot_retry: RetryConfig,

    /// Expected server liveness probe interval, in milliseconds.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Probe silence tolerated, as a multiple of the interval, before a
    /// forced reconnect.
    #[serde(default = "default_heartbeat_timeout_factor")]
    pub heartbeat_timeout_factor: u32,

    /// Activity log capacity.
    #[serde(default = "default_activity_log_cap")]
    pub activity_log_cap: usize,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".into()
}

fn default_connect_grace_ms() -> u64 {
    1000
}

fn default_provisioning_delay_ms() -> u64 {
    3000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_heartbeat_timeout_factor() -> u32 {
    3
}

fn default_activity_log_cap() -> usize {
    DEFAULT_ACTIVITY_CAP
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ws_url: None,
            connect_grace_ms: default_connect_grace_ms(),
            provisioning_delay_ms: default_provisioning_delay_ms(),
            reconnect: ReconnectPolicy::default(),
            snapshot_retry: RetryConfig::default(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_factor: default_heartbeat_timeout_factor(),
            activity_log_cap: default_activity_log_cap(),
        }
    }
}

impl MonitorConfig {
    /// Delay between bootstrap and the first connect attempt.
    #[must_use]
    pub fn connect_grace(&self) -> Duration {
        Duration::from_millis(self.connect_grace_ms)
    }

    /// Fixed delay between 404 snapshot retries.
    #[must_use]
    pub fn provisioning_delay(&self) -> Duration {
        Duration::from_millis(self.provisioning_delay_ms)
    }

    /// Expected liveness probe interval.
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Websocket endpoint for a session, derived from `ws_url` or
    /// `base_url`.
    #[must_use]
    pub fn ws_endpoint(&self, session_id: &str) -> String {
        let base = self.ws_url.clone().unwrap_or_else(|| {
            if let Some(rest) = self.base_url.strip_prefix("https://") {
                format!("wss://{rest}")
            } else if let Some(rest) = self.base_url.strip_prefix("http://") {
                format!("ws://{rest}")
            } else {
                self.base_url.clone()
            }
        });
        format!("{}/ws/{session_id}", base.trim_end_matches('/'))
    }

    /// HTTP snapshot endpoint for a session.
    #[must_use]
    pub fn snapshot_endpoint(&self, session_id: &str) -> String {
        format!(
            "{}/analysis/{session_id}",
            self.base_url.trim_end_matches('/')
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_backend_dev_setup() {
        let config = MonitorConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:8000");
        assert_eq!(config.connect_grace(), Duration::from_secs(1));
        assert_eq!(config.provisioning_delay(), Duration::from_secs(3));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.heartbeat_timeout_factor, 3);
        assert_eq!(config.activity_log_cap, 200);
    }

    #[test]
    fn ws_endpoint_derives_scheme_from_base_url() {
        let mut config = MonitorConfig {
            base_url: "http://localhost:8000".into(),
            ..MonitorConfig::default()
        };
        assert_eq!(config.ws_endpoint("abc"), "ws://localhost:8000/ws/abc");

        config.base_url = "https://api.example.com/".into();
        assert_eq!(config.ws_endpoint("abc"), "wss://api.example.com/ws/abc");
    }

    #[test]
    fn explicit_ws_url_takes_precedence() {
        let config = MonitorConfig {
            ws_url: Some("ws://other-host:9000".into()),
            ..MonitorConfig::default()
        };
        assert_eq!(config.ws_endpoint("s1"), "ws://other-host:9000/ws/s1");
    }

    #[test]
    fn snapshot_endpoint_shape() {
        let config = MonitorConfig::default();
        assert_eq!(
            config.snapshot_endpoint("s1"),
            "http://127.0.0.1:8000/analysis/s1"
        );
    }

    #[test]
    fn deserializes_partial_overrides() {
        let config: MonitorConfig =
            serde_json::from_str(r#"{"base_url": "http://host:1234", "heartbeat_interval_ms": 5000}"#)
                .unwrap();
        assert_eq!(config.base_url, "http://host:1234");
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(5));
        assert_eq!(config.reconnect, ReconnectPolicy::default());
    }
}
