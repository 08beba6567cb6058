//! Session state store.
//!
//! Owns the reconciled [`Session`], the [`ConnectionInfo`], and the bounded
//! activity log. Reads are lock-guarded clones; mutations happen only
//! through the reconciler task via [`SessionStore::mutate`], which bumps the
//! revision and notifies subscribers exactly once per accepted mutation.

use std::sync::Arc;

use agentwatch_core::activity::{ActivityEntry, ActivityKind, ActivityLog};
use agentwatch_core::connection::ConnectionInfo;
use agentwatch_core::session::Session;
use parking_lot::RwLock;
use tokio::sync::watch;

/// Shared handle to one session's state. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: RwLock<StoreState>,
    revision_tx: watch::Sender<u64>,
}

/// The mutable state guarded by the store's lock.
#[derive(Debug)]
pub(crate) struct StoreState {
    pub(crate) session: Session,
    pub(crate) connection: ConnectionInfo,
    pub(crate) activity: ActivityLog,
}

impl StoreState {
    /// Record an activity entry. Returns `true` so callers can fold it
    /// into their changed flag.
    pub(crate) fn record(
        &mut self,
        kind: ActivityKind,
        message: impl Into<String>,
        agent: Option<&str>,
    ) -> bool {
        self.activity.push(kind, message, agent);
        true
    }
}

impl SessionStore {
    /// A fresh store for the given session id.
    #[must_use]
    pub fn new(session_id: &str, activity_cap: usize) -> Self {
        let (revision_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(StoreState {
                    session: Session::new(session_id),
                    connection: ConnectionInfo::default(),
                    activity: ActivityLog::with_capacity(activity_cap),
                }),
                revision_tx,
            }),
        }
    }

    /// Clone of the current session state.
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.inner.state.read().session.clone()
    }

    /// Current push channel state and retry bookkeeping.
    #[must_use]
    pub fn connection(&self) -> ConnectionInfo {
        self.inner.state.read().connection
    }

    /// Oldest-to-newest copy of the activity log.
    #[must_use]
    pub fn activity(&self) -> Vec<ActivityEntry> {
        self.inner.state.read().activity.entries()
    }

    /// Current revision; increases by one per accepted mutation.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.state.read().session.revision
    }

    /// Subscribe to revision ticks. Consumers cache the last revision they
    /// rendered and skip values they have already seen.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision_tx.subscribe()
    }

    /// Apply a mutation. When the closure reports a change, the revision is
    /// bumped and subscribers are notified once; otherwise nothing is
    /// observable.
    pub(crate) fn mutate(&self, f: impl FnOnce(&mut StoreState) -> bool) {
        let revision = {
            let mut state = self.inner.state.write();
            if !f(&mut state) {
                return;
            }
            state.session.revision += 1;
            state.session.revision
        };
        let _ = self.inner.revision_tx.send_replace(revision);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
