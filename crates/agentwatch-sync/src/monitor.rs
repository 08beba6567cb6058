//! Session monitor.
//!
//! Owns everything for one watched session: the store, the reconciler
//! drain task, the snapshot bootstrap, and the push channel. Teardown is
//! a single cancellation token shared by every task, so [`close`] (and
//! `Drop`) stops fetches, timers, and the websocket in one step.
//!
//! [`close`]: SessionMonitor::close

use agentwatch_core::connection::{is_temp_session, ConnectionInfo};
use agentwatch_core::errors::FetchError;
use agentwatch_core::session::Session;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::channel::{spawn_channel, ChannelCommand};
use crate::config::MonitorConfig;
use crate::reconciler::{spawn_drain, Reconciler, ReconcilerInput};
use crate::snapshot::SnapshotFetcher;
use crate::store::SessionStore;

/// Live view of one remote analysis session.
///
/// Dropping the monitor tears everything down; [`SessionMonitor::close`]
/// does the same explicitly and is safe to call repeatedly.
#[derive(Debug)]
pub struct SessionMonitor {
    session_id: String,
    store: SessionStore,
    fetcher: SnapshotFetcher,
    config: MonitorConfig,
    events_tx: mpsc::Sender<ReconcilerInput>,
    command_tx: Option<mpsc::Sender<ChannelCommand>>,
    cancel: CancellationToken,
}

impl SessionMonitor {
    /// Open a monitor: spawns the reconciler, starts the snapshot
    /// bootstrap, and (for real sessions, after the grace delay) the push
    /// channel. Session ids prefixed `temp-` are client-only placeholders
    /// and run in snapshot-only mode with no channel at all.
    #[must_use]
    pub fn open(config: MonitorConfig, session_id: &str) -> Self {
        let store = SessionStore::new(session_id, config.activity_log_cap);
        let cancel = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::channel(256);

        let _ = spawn_drain(Reconciler::new(store.clone()), events_rx, cancel.clone());

        let fetcher = SnapshotFetcher::new(config.clone());
        {
            let fetcher = fetcher.clone();
            let events_tx = events_tx.clone();
            let cancel = cancel.clone();
            let retry = config.snapshot_retry;
            let session_id = session_id.to_owned();
            let _ = tokio::spawn(async move {
                if let Some(snapshot) = fetcher
                    .fetch_until_ready(&session_id, &retry, &cancel)
                    .await
                {
                    if events_tx
                        .send(ReconcilerInput::Snapshot(snapshot))
                        .await
                        .is_err()
                    {
                        tracing::debug!(session_id = %session_id, "reconciler queue closed");
                    }
                }
            });
        }

        let command_tx = if is_temp_session(session_id) {
            tracing::debug!(session_id = %session_id, "temporary session, snapshot-only mode");
            None
        } else {
            let (_handle, command_tx) = spawn_channel(
                &config,
                session_id,
                store.clone(),
                events_tx.clone(),
                cancel.clone(),
            );
            Some(command_tx)
        };

        Self {
            session_id: session_id.to_owned(),
            store,
            fetcher,
            config,
            events_tx,
            command_tx,
            cancel,
        }
    }

    /// The session id this monitor watches.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The underlying store handle.
    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Clone of the current session state.
    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.store.snapshot()
    }

    /// Current push channel state.
    #[must_use]
    pub fn connection(&self) -> ConnectionInfo {
        self.store.connection()
    }

    /// Subscribe to revision ticks.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.store.subscribe()
    }

    /// The configuration this monitor was opened with.
    #[must_use]
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Fetch a fresh snapshot now and merge it. The merge never regresses
    /// state already advanced by push events.
    pub async fn refresh(&self) -> Result<(), FetchError> {
        let snapshot = self.fetcher.fetch(&self.session_id).await?;
        if self
            .events_tx
            .send(ReconcilerInput::Snapshot(snapshot))
            .await
            .is_err()
        {
            tracing::debug!(session_id = %self.session_id, "refresh after teardown, dropped");
        }
        Ok(())
    }

    /// Ask the channel to reconnect now, resetting the attempt counter.
    /// The escape hatch out of `PermanentlyFailed`. No-op for temporary
    /// sessions.
    pub fn retry_connection(&self) {
        if let Some(command_tx) = &self.command_tx {
            if command_tx.try_send(ChannelCommand::Retry).is_err() {
                tracing::debug!(session_id = %self.session_id, "channel task not accepting commands");
            }
        }
    }

    /// Tear everything down: the channel closes with a normal close code,
    /// timers are cancelled, fetches stop. Idempotent.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(session_id = %self.session_id, "closing monitor");
            self.cancel.cancel();
        }
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        self.close();
    }
}
