//! Error types for the sync engine.

use thiserror::Error;

/// Failure to fetch a session snapshot.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The session is not provisioned yet (HTTP 404); expected during the
    /// bootstrap window and retried on a fixed delay.
    #[error("session not found")]
    NotFound,

    /// Network-level failure (connect, timeout, body read); retried with
    /// backoff.
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// Unexpected HTTP status; 5xx is retried, 4xx (other than 404) is not.
    #[error("unexpected status {0}")]
    Status(u16),

    /// The response body was not a valid snapshot.
    #[error("malformed snapshot: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FetchError {
    /// Whether retrying this failure can succeed without operator action.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotFound | Self::Transport(_) => true,
            Self::Status(code) => *code >= 500,
            Self::Decode(_) => false,
        }
    }
}

/// Failure on the push channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The websocket handshake or transport failed.
    #[error("websocket failure: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
