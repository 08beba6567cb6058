//! Push channel wire events.
//!
//! Every frame on the push channel is a JSON object tagged by a `type`
//! field. [`PushEvent`] mirrors that envelope; unknown tags and malformed
//! frames are a protocol error handled by the caller (log and drop, channel
//! stays open).

use serde::{Deserialize, Serialize};

use crate::session::SessionSnapshot;

/// A decoded push channel event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEvent {
    /// The analysis pipeline started running.
    AnalysisStarted {
        /// Human-readable announcement.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// An agent began working.
    AgentActive {
        /// Name of the now-active agent.
        current_agent: String,
        /// Human-readable announcement.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// An agent finished and produced output.
    AgentCompleted {
        /// Name of the finished agent.
        agent: String,
        /// The agent's output, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
        /// Human-readable announcement.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// A full snapshot pushed mid-stream.
    ProgressUpdate {
        /// The embedded session snapshot.
        progress: SessionSnapshot,
    },
    /// The analysis reached its terminal state.
    AnalysisComplete {
        /// Final decision text.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        final_decision: Option<String>,
    },
    /// The analysis failed.
    AnalysisError {
        /// Error description.
        error: String,
    },
    /// A progress broadcast failed server-side.
    ProgressUpdateError {
        /// Error description.
        error: String,
    },
    /// Server acknowledgement sent when the channel opens.
    ConnectionEstablished {
        /// Session the channel is bound to.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    /// Server notice that the session id is a client-only placeholder.
    TempSession {
        /// Human-readable notice.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Liveness probe from the server.
    Ping {
        /// Probe timestamp, echoed in the reply.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    /// Liveness reply.
    Pong {
        /// Reply timestamp.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
}

impl PushEvent {
    /// The wire `type` tag, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AnalysisStarted { .. } => "analysis_started",
            Self::AgentActive { .. } => "agent_active",
            Self::AgentCompleted { .. } => "agent_completed",
            Self::ProgressUpdate { .. } => "progress_update",
            Self::AnalysisComplete { .. } => "analysis_complete",
            Self::AnalysisError { .. } => "analysis_error",
            Self::ProgressUpdateError { .. } => "progress_update_error",
            Self::ConnectionEstablished { .. } => "connection_established",
            Self::TempSession { .. } => "temp_session",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
        }
    }

    /// Whether this event ends the session (no reconnects afterwards).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::AnalysisComplete { .. } | Self::AnalysisError { .. }
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
