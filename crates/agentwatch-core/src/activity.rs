//! Bounded activity log.
//!
//! A diagnostic ring of recent session happenings. Purely informational;
//! dropping old entries never affects reconciliation.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of entries retained.
pub const DEFAULT_ACTIVITY_CAP: usize = 200;

/// Category of an activity entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// General announcement.
    Info,
    /// An agent became active.
    Active,
    /// An agent or the whole analysis finished.
    Completed,
    /// An error was reported.
    Error,
}

/// One entry in the activity log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    /// Monotonic sequence number, unique within the log's lifetime.
    pub seq: u64,
    /// Entry category.
    pub kind: ActivityKind,
    /// Human-readable message.
    pub message: String,
    /// Agent the entry concerns, if any.
    pub agent: Option<String>,
    /// When the entry was recorded.
    pub at: DateTime<Utc>,
}

/// Bounded ring of recent activity entries.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEntry>,
    cap: usize,
    next_seq: u64,
}

impl ActivityLog {
    /// A log retaining at most `cap` entries (`cap` of zero keeps nothing).
    #[must_use]
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(cap.min(DEFAULT_ACTIVITY_CAP)),
            cap,
            next_seq: 0,
        }
    }

    /// Record an entry, evicting the oldest when full.
    pub fn push(&mut self, kind: ActivityKind, message: impl Into<String>, agent: Option<&str>) {
        if self.cap == 0 {
            return;
        }
        while self.entries.len() >= self.cap {
            let _ = self.entries.pop_front();
        }
        self.entries.push_back(ActivityEntry {
            seq: self.next_seq,
            kind,
            message: message.into(),
            agent: agent.map(str::to_owned),
            at: Utc::now(),
        });
        self.next_seq += 1;
    }

    /// Oldest-to-newest copy of the retained entries.
    #[must_use]
    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Number of retained entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_ACTIVITY_CAP)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
