//! Event reconciler.
//!
//! Single writer for the session store. Push events, pulled snapshots, and
//! connectivity transitions all arrive on one queue and are applied by one
//! task, so ordering races between the feeds collapse into a deterministic
//! merge:
//!
//! - applying is infallible: an input that cannot be applied is logged and
//!   dropped, never an error
//! - duplicates and reordered deliveries converge to the same state
//! - terminal state absorbs later non-terminal inputs
//! - per-agent timestamps are monotonic; snapshots win timestamp ties

use agentwatch_core::activity::ActivityKind;
use agentwatch_core::connection::ConnectionInfo;
use agentwatch_core::events::PushEvent;
use agentwatch_core::session::{team_of, AgentState, AgentStatus, SessionSnapshot};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::store::{SessionStore, StoreState};

/// Inputs accepted by the reconciler queue.
#[derive(Debug)]
pub enum ReconcilerInput {
    /// A decoded push channel event.
    Event(PushEvent),
    /// A full snapshot from the fetcher (or embedded in a push event).
    Snapshot(SessionSnapshot),
    /// A push channel lifecycle transition.
    Connectivity(ConnectionInfo),
}

/// Applies inputs to the store. Owns no tasks; [`spawn_drain`] wires it to
/// a queue.
#[derive(Debug, Clone)]
pub struct Reconciler {
    store: SessionStore,
}

impl Reconciler {
    /// A reconciler writing into `store`.
    #[must_use]
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    /// Apply one input. Never fails; inapplicable inputs are dropped with
    /// a log line.
    pub fn apply(&self, input: ReconcilerInput) {
        match input {
            ReconcilerInput::Event(event) => self.apply_event(event),
            ReconcilerInput::Snapshot(snapshot) => {
                self.store.mutate(|state| merge_snapshot(state, &snapshot));
            }
            ReconcilerInput::Connectivity(info) => {
                self.store.mutate(|state| {
                    if state.connection == info {
                        return false;
                    }
                    state.connection = info;
                    true
                });
            }
        }
    }

    fn apply_event(&self, event: PushEvent) {
        let kind = event.kind();
        tracing::debug!(event_type = kind, "applying push event");
        match event {
            PushEvent::AnalysisStarted { message } => {
                self.store.mutate(|state| {
                    let text = message.unwrap_or_else(|| "Analysis started".into());
                    state.record(ActivityKind::Info, text, None)
                });
            }
            PushEvent::AgentActive {
                current_agent,
                message,
            } => {
                self.store
                    .mutate(|state| apply_agent_active(state, &current_agent, message));
            }
            PushEvent::AgentCompleted {
                agent,
                output,
                message,
            } => {
                self.store
                    .mutate(|state| apply_agent_completed(state, &agent, output, message));
            }
            PushEvent::ProgressUpdate { progress } => {
                self.store.mutate(|state| merge_snapshot(state, &progress));
            }
            PushEvent::AnalysisComplete { final_decision } => {
                self.store
                    .mutate(|state| apply_analysis_complete(state, final_decision));
            }
            PushEvent::AnalysisError { error } => {
                self.store.mutate(|state| {
                    if state.session.failed
                        && state.session.last_error.as_deref() == Some(error.as_str())
                    {
                        tracing::debug!("duplicate analysis_error");
                        return false;
                    }
                    state.session.last_error = Some(error.clone());
                    state.session.failed = true;
                    state.record(ActivityKind::Error, error, None)
                });
            }
            PushEvent::ProgressUpdateError { error } => {
                self.store.mutate(|state| {
                    state.session.last_error = Some(error.clone());
                    state.record(ActivityKind::Error, error, None)
                });
            }
            PushEvent::ConnectionEstablished { session_id } => {
                tracing::debug!(session_id = ?session_id, "channel acknowledged");
            }
            PushEvent::TempSession { .. } => {
                tracing::debug!("temporary session notice");
            }
            // Liveness traffic is answered in the channel task and never
            // reaches the queue; tolerate it anyway.
            PushEvent::Ping { .. } | PushEvent::Pong { .. } => {
                tracing::debug!(event_type = kind, "liveness event reached reconciler");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Merge rules
// ─────────────────────────────────────────────────────────────────────────────

fn apply_agent_active(state: &mut StoreState, agent: &str, message: Option<String>) -> bool {
    if state.session.is_terminal() {
        tracing::debug!(agent = %agent, "discarding agent_active for terminal session");
        return false;
    }
    let entry = state
        .session
        .agent_statuses
        .entry(agent.to_owned())
        .or_insert_with(|| AgentState::pending(agent, team_of(agent).unwrap_or("")));
    if !entry.status.is_settled() {
        entry.status = AgentStatus::InProgress;
        // Per-agent timestamps never move backwards, even under clock skew.
        entry.timestamp = entry.timestamp.max(Utc::now());
    }
    state.session.current_agent = Some(agent.to_owned());
    let text = message.unwrap_or_else(|| format!("{agent} is working"));
    state.record(ActivityKind::Active, text, Some(agent))
}

fn apply_agent_completed(
    state: &mut StoreState,
    agent: &str,
    output: Option<String>,
    message: Option<String>,
) -> bool {
    if state.session.is_terminal() {
        tracing::debug!(agent = %agent, "discarding agent_completed for terminal session");
        return false;
    }
    let entry = state
        .session
        .agent_statuses
        .entry(agent.to_owned())
        .or_insert_with(|| AgentState::pending(agent, team_of(agent).unwrap_or("")));

    if entry.status == AgentStatus::Completed {
        // Re-delivery: only fill in output we did not have yet.
        if entry.output.is_none() && output.is_some() {
            entry.output = output;
            return true;
        }
        tracing::debug!(agent = %agent, "duplicate agent_completed");
        return false;
    }

    entry.status = AgentStatus::Completed;
    if output.is_some() {
        entry.output = output;
    }
    entry.timestamp = entry.timestamp.max(Utc::now());
    if state.session.current_agent.as_deref() == Some(agent) {
        state.session.current_agent = None;
    }
    let text = message.unwrap_or_else(|| format!("{agent} completed"));
    state.record(ActivityKind::Completed, text, Some(agent))
}

fn apply_analysis_complete(state: &mut StoreState, final_decision: Option<String>) -> bool {
    let mut changed = false;
    if !state.session.is_complete {
        state.session.is_complete = true;
        state.session.current_agent = None;
        changed = true;
    }
    if state.session.final_decision.is_none() && final_decision.is_some() {
        state.session.final_decision = final_decision;
        changed = true;
    }
    if changed {
        let _ = state.record(ActivityKind::Completed, "Analysis complete", None);
    } else {
        tracing::debug!("duplicate analysis_complete");
    }
    changed
}

/// Field-wise snapshot merge. Incoming per-agent state wins only when its
/// timestamp is at least the stored one; `is_complete` only ratchets up;
/// immutable fields fill in when empty.
fn merge_snapshot(state: &mut StoreState, snapshot: &SessionSnapshot) -> bool {
    let session = &mut state.session;
    let mut changed = false;

    if session.ticker.is_empty() && !snapshot.ticker.is_empty() {
        session.ticker = snapshot.ticker.clone();
        changed = true;
    }
    if session.analysis_date.is_empty() && !snapshot.analysis_date.is_empty() {
        session.analysis_date = snapshot.analysis_date.clone();
        changed = true;
    }

    let terminal = session.is_terminal();
    for (name, wire) in &snapshot.agent_statuses {
        let incoming = wire.clone().into_agent_state(name);
        // A finished session accepts no pending/in-progress transitions.
        if terminal && !incoming.status.is_settled() {
            continue;
        }
        match session.agent_statuses.get_mut(name) {
            None => {
                let _ = session.agent_statuses.insert(name.clone(), incoming);
                changed = true;
            }
            Some(stored) => {
                if incoming.timestamp >= stored.timestamp && incoming != *stored {
                    *stored = incoming;
                    changed = true;
                }
            }
        }
    }

    if snapshot.is_complete && !session.is_complete {
        session.is_complete = true;
        session.current_agent = None;
        changed = true;
    }
    if session.is_complete
        && session.final_decision.is_none()
        && snapshot.final_decision.is_some()
    {
        session.final_decision = snapshot.final_decision.clone();
        changed = true;
    }
    if !session.is_terminal()
        && snapshot.current_agent.is_some()
        && session.current_agent != snapshot.current_agent
    {
        session.current_agent = snapshot.current_agent.clone();
        changed = true;
    }

    changed
}

// ─────────────────────────────────────────────────────────────────────────────
// Drain task
// ─────────────────────────────────────────────────────────────────────────────

/// Spawn the single-writer drain task. Runs until the queue closes or the
/// token is cancelled.
pub fn spawn_drain(
    reconciler: Reconciler,
    mut rx: mpsc::Receiver<ReconcilerInput>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                input = rx.recv() => match input {
                    Some(input) => reconciler.apply(input),
                    None => break,
                },
            }
        }
        tracing::debug!("reconciler drain stopped");
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use agentwatch_core::session::WireAgentState;
    use agentwatch_core::time::format_wire_timestamp;
    use chrono::Duration;

    use super::*;

    fn setup() -> (Reconciler, SessionStore) {
        let store = SessionStore::new("s1", 50);
        (Reconciler::new(store.clone()), store)
    }

    fn completed(agent: &str, output: &str) -> ReconcilerInput {
        ReconcilerInput::Event(PushEvent::AgentCompleted {
            agent: agent.into(),
            output: Some(output.into()),
            message: None,
        })
    }

    fn active(agent: &str) -> ReconcilerInput {
        ReconcilerInput::Event(PushEvent::AgentActive {
            current_agent: agent.into(),
            message: None,
        })
    }

    fn wire_agent(status: AgentStatus, at_offset_secs: i64) -> WireAgentState {
        WireAgentState {
            agent_name: String::new(),
            status,
            team: "Analyst Team".into(),
            timestamp: Some(format_wire_timestamp(
                Utc::now() + Duration::seconds(at_offset_secs),
            )),
            output: None,
        }
    }

    fn snapshot_with(agents: Vec<(&str, WireAgentState)>) -> SessionSnapshot {
        SessionSnapshot {
            session_id: "s1".into(),
            ticker: "NVDA".into(),
            analysis_date: "2026-08-29".into(),
            agent_statuses: agents
                .into_iter()
                .map(|(n, w)| (n.to_owned(), w))
                .collect::<BTreeMap<_, _>>(),
            current_agent: None,
            is_complete: false,
            final_decision: None,
        }
    }

    #[test]
    fn agent_active_marks_in_progress() {
        let (reconciler, store) = setup();
        reconciler.apply(active("Market Analyst"));

        let session = store.snapshot();
        assert_eq!(
            session.agent_statuses["Market Analyst"].status,
            AgentStatus::InProgress
        );
        assert_eq!(session.current_agent.as_deref(), Some("Market Analyst"));
        assert_eq!(
            session.agent_statuses["Market Analyst"].team,
            "Analyst Team"
        );
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn duplicate_agent_completed_is_idempotent() {
        let (reconciler, store) = setup();
        reconciler.apply(completed("Trader", "buy"));
        let after_first = store.snapshot();
        let revision_after_first = store.revision();

        reconciler.apply(completed("Trader", "buy"));
        let after_second = store.snapshot();

        assert_eq!(after_first.agent_statuses, after_second.agent_statuses);
        assert_eq!(store.revision(), revision_after_first);
        assert_eq!(store.activity().len(), 1);
    }

    #[test]
    fn agent_active_after_completed_does_not_demote() {
        let (reconciler, store) = setup();
        reconciler.apply(completed("News Analyst", "report"));
        reconciler.apply(active("News Analyst"));

        let session = store.snapshot();
        assert_eq!(
            session.agent_statuses["News Analyst"].status,
            AgentStatus::Completed
        );
        assert_eq!(
            session.agent_statuses["News Analyst"].output.as_deref(),
            Some("report")
        );
    }

    #[test]
    fn analysis_complete_is_terminal_and_absorbing() {
        let (reconciler, store) = setup();
        reconciler.apply(ReconcilerInput::Event(PushEvent::AnalysisComplete {
            final_decision: Some("HOLD".into()),
        }));
        let revision = store.revision();

        reconciler.apply(active("Trader"));
        reconciler.apply(completed("Trader", "late"));

        let session = store.snapshot();
        assert!(session.is_complete);
        assert_eq!(session.final_decision.as_deref(), Some("HOLD"));
        assert!(session.agent_statuses.is_empty());
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn duplicate_analysis_complete_is_a_no_op() {
        let (reconciler, store) = setup();
        let event = || {
            ReconcilerInput::Event(PushEvent::AnalysisComplete {
                final_decision: Some("SELL".into()),
            })
        };
        reconciler.apply(event());
        let revision = store.revision();
        reconciler.apply(event());
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn analysis_error_records_and_terminates() {
        let (reconciler, store) = setup();
        reconciler.apply(ReconcilerInput::Event(PushEvent::AnalysisError {
            error: "model blew up".into(),
        }));

        let session = store.snapshot();
        assert_eq!(session.last_error.as_deref(), Some("model blew up"));
        assert!(session.is_terminal());
        assert!(!session.is_complete);
    }

    #[test]
    fn progress_update_error_is_not_terminal() {
        let (reconciler, store) = setup();
        reconciler.apply(ReconcilerInput::Event(PushEvent::ProgressUpdateError {
            error: "broadcast failed".into(),
        }));

        let session = store.snapshot();
        assert_eq!(session.last_error.as_deref(), Some("broadcast failed"));
        assert!(!session.is_terminal());
    }

    #[test]
    fn snapshot_then_stream_converges() {
        let (reconciler, store) = setup();
        reconciler.apply(ReconcilerInput::Snapshot(snapshot_with(vec![
            ("A", wire_agent(AgentStatus::Pending, -10)),
            ("B", wire_agent(AgentStatus::Completed, -10)),
        ])));
        reconciler.apply(completed("A", "done"));

        let session = store.snapshot();
        assert_eq!(session.agent_statuses["A"].status, AgentStatus::Completed);
        assert_eq!(session.agent_statuses["B"].status, AgentStatus::Completed);
        assert_eq!(session.ticker, "NVDA");
    }

    #[test]
    fn stale_snapshot_does_not_regress_stream_state() {
        let (reconciler, store) = setup();
        reconciler.apply(completed("A", "fresh output"));
        reconciler.apply(ReconcilerInput::Snapshot(snapshot_with(vec![(
            "A",
            wire_agent(AgentStatus::InProgress, -60),
        )])));

        let session = store.snapshot();
        assert_eq!(session.agent_statuses["A"].status, AgentStatus::Completed);
        assert_eq!(
            session.agent_statuses["A"].output.as_deref(),
            Some("fresh output")
        );
    }

    #[test]
    fn newer_snapshot_wins_over_stored_state() {
        let (reconciler, store) = setup();
        reconciler.apply(active("A"));
        reconciler.apply(ReconcilerInput::Snapshot(snapshot_with(vec![(
            "A",
            wire_agent(AgentStatus::Completed, 60),
        )])));

        let session = store.snapshot();
        assert_eq!(session.agent_statuses["A"].status, AgentStatus::Completed);
    }

    #[test]
    fn is_complete_ratchets_up_only() {
        let (reconciler, store) = setup();
        reconciler.apply(ReconcilerInput::Event(PushEvent::AnalysisComplete {
            final_decision: Some("BUY".into()),
        }));

        let mut stale = snapshot_with(vec![]);
        stale.is_complete = false;
        reconciler.apply(ReconcilerInput::Snapshot(stale));

        assert!(store.snapshot().is_complete);
    }

    #[test]
    fn completion_never_regresses_a_skewed_agent_timestamp() {
        let (reconciler, store) = setup();
        // A snapshot from a fast-running server clock stamps the agent
        // in the future.
        reconciler.apply(ReconcilerInput::Snapshot(snapshot_with(vec![(
            "A",
            wire_agent(AgentStatus::InProgress, 60),
        )])));
        let skewed = store.snapshot().agent_statuses["A"].timestamp;

        reconciler.apply(completed("A", "done"));
        reconciler.apply(active("A"));

        let agent = store.snapshot().agent_statuses["A"].clone();
        assert_eq!(agent.status, AgentStatus::Completed);
        assert!(agent.timestamp >= skewed);
    }

    #[test]
    fn terminal_session_ignores_snapshot_demotions() {
        let (reconciler, store) = setup();
        reconciler.apply(completed("A", "done"));
        reconciler.apply(ReconcilerInput::Event(PushEvent::AnalysisComplete {
            final_decision: Some("BUY".into()),
        }));
        reconciler.apply(ReconcilerInput::Snapshot(snapshot_with(vec![(
            "A",
            wire_agent(AgentStatus::InProgress, 60),
        )])));

        assert_eq!(
            store.snapshot().agent_statuses["A"].status,
            AgentStatus::Completed
        );
    }

    #[test]
    fn final_decision_requires_completion() {
        let (reconciler, store) = setup();
        let mut snapshot = snapshot_with(vec![]);
        snapshot.final_decision = Some("early leak".into());
        reconciler.apply(ReconcilerInput::Snapshot(snapshot.clone()));
        assert!(store.snapshot().final_decision.is_none());

        snapshot.is_complete = true;
        reconciler.apply(ReconcilerInput::Snapshot(snapshot));
        assert_eq!(
            store.snapshot().final_decision.as_deref(),
            Some("early leak")
        );
    }

    #[test]
    fn immutable_fields_fill_in_once() {
        let (reconciler, store) = setup();
        reconciler.apply(ReconcilerInput::Snapshot(snapshot_with(vec![])));

        let mut second = snapshot_with(vec![]);
        second.ticker = "SPY".into();
        second.analysis_date = "2020-01-01".into();
        reconciler.apply(ReconcilerInput::Snapshot(second));

        let session = store.snapshot();
        assert_eq!(session.ticker, "NVDA");
        assert_eq!(session.analysis_date, "2026-08-29");
    }

    #[test]
    fn identical_snapshot_reapplied_is_silent() {
        let (reconciler, store) = setup();
        let snapshot = snapshot_with(vec![("A", wire_agent(AgentStatus::Completed, 0))]);
        reconciler.apply(ReconcilerInput::Snapshot(snapshot.clone()));
        let revision = store.revision();
        reconciler.apply(ReconcilerInput::Snapshot(snapshot));
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn connectivity_transitions_are_stored() {
        use agentwatch_core::connection::ConnectionState;

        let (reconciler, store) = setup();
        let info = ConnectionInfo {
            state: ConnectionState::Connecting,
            attempt_count: 2,
            next_retry_at: None,
        };
        reconciler.apply(ReconcilerInput::Connectivity(info));
        assert_eq!(store.connection(), info);
        let revision = store.revision();

        // Same transition twice is silent.
        reconciler.apply(ReconcilerInput::Connectivity(info));
        assert_eq!(store.revision(), revision);
    }

    #[tokio::test]
    async fn drain_task_applies_queued_inputs() {
        let (reconciler, store) = setup();
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let handle = spawn_drain(reconciler, rx, cancel.clone());

        tx.send(active("Trader")).await.unwrap();
        tx.send(completed("Trader", "hold")).await.unwrap();

        let mut sub = store.subscribe();
        while *sub.borrow_and_update() < 2 {
            sub.changed().await.unwrap();
        }
        assert_eq!(
            store.snapshot().agent_statuses["Trader"].status,
            AgentStatus::Completed
        );

        cancel.cancel();
        handle.await.unwrap();
    }
}
