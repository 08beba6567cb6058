//! Snapshot fetcher.
//!
//! Pull-based recovery over HTTP. A 404 means the session is not
//! provisioned yet (the backend creates it asynchronously after job
//! submission), so bootstrap retries on a fixed delay; network and 5xx
//! failures back off exponentially.

use std::time::Duration;

use agentwatch_core::errors::FetchError;
use agentwatch_core::retry::RetryConfig;
use agentwatch_core::session::SessionSnapshot;
use tokio_util::sync::CancellationToken;

use crate::config::MonitorConfig;

/// Fetches session snapshots from the analysis backend.
#[derive(Debug, Clone)]
pub struct SnapshotFetcher {
    client: reqwest::Client,
    config: MonitorConfig,
}

impl SnapshotFetcher {
    /// A fetcher for the configured backend.
    #[must_use]
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Fetch the current snapshot once.
    pub async fn fetch(&self, session_id: &str) -> Result<SessionSnapshot, FetchError> {
        let url = self.config.snapshot_endpoint(session_id);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound);
        }
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Fetch with retries until the session exists, a non-retryable error
    /// occurs, the attempt budget runs out, or `cancel` fires.
    ///
    /// 404 waits the fixed provisioning delay; transient failures back off
    /// per `retry`. Each error class has its own attempt budget of
    /// `retry.max_retries`.
    pub async fn fetch_until_ready(
        &self,
        session_id: &str,
        retry: &RetryConfig,
        cancel: &CancellationToken,
    ) -> Option<SessionSnapshot> {
        let mut not_found_attempts: u32 = 0;
        let mut transient_attempts: u32 = 0;

        loop {
            match self.fetch(session_id).await {
                Ok(snapshot) => {
                    tracing::debug!(session_id = %session_id, "snapshot fetched");
                    return Some(snapshot);
                }
                Err(FetchError::NotFound) => {
                    not_found_attempts += 1;
                    if not_found_attempts > retry.max_retries {
                        tracing::warn!(
                            session_id = %session_id,
                            attempts = not_found_attempts,
                            "session never provisioned, giving up on bootstrap"
                        );
                        return None;
                    }
                    tracing::debug!(
                        session_id = %session_id,
                        attempt = not_found_attempts,
                        "session not provisioned yet, waiting"
                    );
                    if !self.wait(self.config.provisioning_delay(), cancel).await {
                        return None;
                    }
                }
                Err(err) if err.is_retryable() => {
                    transient_attempts += 1;
                    if transient_attempts > retry.max_retries {
                        tracing::warn!(
                            session_id = %session_id,
                            attempts = transient_attempts,
                            error = %err,
                            "snapshot retries exhausted"
                        );
                        return None;
                    }
                    let delay = retry.backoff_delay(transient_attempts - 1);
                    tracing::debug!(
                        session_id = %session_id,
                        attempt = transient_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient snapshot failure, backing off"
                    );
                    if !self.wait(delay, cancel).await {
                        return None;
                    }
                }
                Err(err) => {
                    tracing::warn!(session_id = %session_id, error = %err, "snapshot fetch failed");
                    return None;
                }
            }
        }
    }

    /// Sleep unless cancelled. Returns `false` when cancelled.
    async fn wait(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
