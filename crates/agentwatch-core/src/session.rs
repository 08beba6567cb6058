//! Session and agent data model.
//!
//! Mirrors the remote backend's snake_case JSON wire format. [`Session`] is
//! the locally reconciled view; [`SessionSnapshot`] is the exact shape the
//! HTTP endpoint returns and `progress_update` events carry.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::parse_wire_timestamp;

// ─────────────────────────────────────────────────────────────────────────────
// Agent status
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle status of a single analysis agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Not yet scheduled.
    #[default]
    Pending,
    /// Currently producing output.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Error,
}

impl AgentStatus {
    /// Whether this status is final for the agent.
    ///
    /// A finished agent is never demoted by a later `agent_active` event;
    /// only a snapshot with a strictly newer timestamp may change it.
    #[must_use]
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent state
// ─────────────────────────────────────────────────────────────────────────────

/// Reconciled state of one agent within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    /// Display name, also the key in [`Session::agent_statuses`].
    pub name: String,
    /// Team the agent belongs to.
    pub team: String,
    /// Current lifecycle status.
    pub status: AgentStatus,
    /// Output produced on completion, if any.
    pub output: Option<String>,
    /// Timestamp of the newest accepted update for this agent.
    pub timestamp: DateTime<Utc>,
}

impl AgentState {
    /// A fresh pending agent.
    #[must_use]
    pub fn pending(name: impl Into<String>, team: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            team: team.into(),
            status: AgentStatus::Pending,
            output: None,
            timestamp: Utc::now(),
        }
    }
}

/// Wire shape of one agent entry inside a snapshot. Timestamps arrive as
/// ISO-8601 strings and are parsed tolerantly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireAgentState {
    /// Display name.
    #[serde(default)]
    pub agent_name: String,
    /// Lifecycle status.
    #[serde(default)]
    pub status: AgentStatus,
    /// Team the agent belongs to.
    #[serde(default)]
    pub team: String,
    /// ISO-8601 timestamp string; may be naive (no offset).
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Output produced on completion.
    #[serde(default)]
    pub output: Option<String>,
}

impl WireAgentState {
    /// Convert into the local model, resolving the wire timestamp.
    #[must_use]
    pub fn into_agent_state(self, fallback_name: &str) -> AgentState {
        let name = if self.agent_name.is_empty() {
            fallback_name.to_owned()
        } else {
            self.agent_name
        };
        let timestamp = self
            .timestamp
            .as_deref()
            .map_or_else(Utc::now, parse_wire_timestamp);
        AgentState {
            name,
            team: self.team,
            status: self.status,
            output: self.output,
            timestamp,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Locally reconciled view of one analysis session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque session identifier; immutable.
    pub session_id: String,
    /// Ticker symbol under analysis; immutable once set.
    pub ticker: String,
    /// Analysis date string; immutable once set.
    pub analysis_date: String,
    /// Per-agent state keyed by agent name; keys are never removed.
    pub agent_statuses: BTreeMap<String, AgentState>,
    /// Name of the agent currently working, if any.
    pub current_agent: Option<String>,
    /// Whether the analysis reached a terminal state; monotonic.
    pub is_complete: bool,
    /// Final decision text, set at most once, only when complete.
    pub final_decision: Option<String>,
    /// Most recent error delivered for this session.
    pub last_error: Option<String>,
    /// Whether a fatal `analysis_error` was delivered; local only.
    #[serde(skip)]
    pub failed: bool,
    /// Strictly increasing on every accepted mutation; local only.
    #[serde(skip)]
    pub revision: u64,
}

impl Session {
    /// An empty session shell for the given id.
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ticker: String::new(),
            analysis_date: String::new(),
            agent_statuses: BTreeMap::new(),
            current_agent: None,
            is_complete: false,
            final_decision: None,
            last_error: None,
            failed: false,
            revision: 0,
        }
    }

    /// Whether the session reached a terminal state (completed or failed).
    ///
    /// Terminal sessions absorb further non-terminal events and the push
    /// channel never reconnects for them.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.is_complete || self.failed
    }

    /// Fraction of agents that finished, as a percentage in `0..=100`.
    #[must_use]
    pub fn progress_percent(&self) -> u8 {
        let total = self.agent_statuses.len();
        if total == 0 {
            return if self.is_complete { 100 } else { 0 };
        }
        let settled = self
            .agent_statuses
            .values()
            .filter(|a| a.status.is_settled())
            .count();
        ((settled * 100) / total) as u8
    }
}

/// Wire shape of a full session snapshot, as returned by the snapshot
/// endpoint and embedded in `progress_update` events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Opaque session identifier.
    #[serde(default)]
    pub session_id: String,
    /// Ticker symbol under analysis.
    #[serde(default)]
    pub ticker: String,
    /// Analysis date string.
    #[serde(default)]
    pub analysis_date: String,
    /// Per-agent wire state keyed by agent name.
    #[serde(default)]
    pub agent_statuses: BTreeMap<String, WireAgentState>,
    /// Name of the agent currently working.
    #[serde(default)]
    pub current_agent: Option<String>,
    /// Whether the analysis reached a terminal state.
    #[serde(default)]
    pub is_complete: bool,
    /// Final decision text, when complete.
    #[serde(default)]
    pub final_decision: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Team roster
// ─────────────────────────────────────────────────────────────────────────────

/// The standard agent roster grouped by team, in pipeline order.
#[must_use]
pub fn teams() -> Vec<(&'static str, Vec<&'static str>)> {
    vec![
        (
            "Analyst Team",
            vec![
                "Market Analyst",
                "Social Analyst",
                "News Analyst",
                "Fundamentals Analyst",
            ],
        ),
        (
            "Research Team",
            vec!["Bull Researcher", "Bear Researcher", "Research Manager"],
        ),
        ("Trading Team", vec!["Trader"]),
        (
            "Risk Management",
            vec!["Risky Analyst", "Neutral Analyst", "Safe Analyst"],
        ),
        ("Portfolio Management", vec!["Portfolio Manager"]),
    ]
}

/// Look up the team a known agent belongs to.
#[must_use]
pub fn team_of(agent: &str) -> Option<&'static str> {
    teams()
        .into_iter()
        .find(|(_, members)| members.contains(&agent))
        .map(|(team, _)| team)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
