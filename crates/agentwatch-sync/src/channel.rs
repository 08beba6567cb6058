//! Push channel manager.
//!
//! One task per session owning the websocket to the analysis backend.
//! Lifecycle: connect, send the hello acknowledgement, pump frames into
//! the reconciler queue, and on close consult the cause-aware
//! [`ReconnectPolicy`]:
//!
//! - normal closure: done, settle in `Disconnected`
//! - session rejected (1008): retry after the long delay
//! - anything else: retry after the medium delay
//! - shared attempt cap; exhausting it settles in `PermanentlyFailed`
//!   until a manual retry command arrives
//! - terminal sessions never reconnect
//!
//! Liveness probes are answered inline and probe silence beyond the
//! keepalive deadline tears the connection down through the abnormal
//! path, so the same policy governs staleness.

use std::time::Duration;

use agentwatch_core::connection::{
    CloseCause, ConnectionInfo, ConnectionState, ReconnectDecision, ReconnectPolicy,
};
use agentwatch_core::errors::ChannelError;
use agentwatch_core::events::PushEvent;
use chrono::{DateTime, Utc};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::config::MonitorConfig;
use crate::keepalive::Keepalive;
use crate::reconciler::ReconcilerInput;
use crate::store::SessionStore;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Commands accepted by a running channel task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelCommand {
    /// Reset the attempt counter and reconnect now.
    Retry,
}

/// Spawn the channel task for a session. Returns the task handle and the
/// command sender used for manual retries.
pub fn spawn_channel(
    config: &MonitorConfig,
    session_id: &str,
    store: SessionStore,
    events_tx: mpsc::Sender<ReconcilerInput>,
    cancel: CancellationToken,
) -> (tokio::task::JoinHandle<()>, mpsc::Sender<ChannelCommand>) {
    let (command_tx, command_rx) = mpsc::channel(4);
    let runner = ChannelRunner {
        endpoint: config.ws_endpoint(session_id),
        session_id: session_id.to_owned(),
        policy: config.reconnect,
        connect_grace: config.connect_grace(),
        keepalive_interval: config.heartbeat_interval(),
        keepalive_factor: config.heartbeat_timeout_factor,
        store,
        events_tx,
        cancel,
        commands: command_rx,
        attempts: 0,
        saw_terminal: false,
    };
    (tokio::spawn(runner.run()), command_tx)
}

struct ChannelRunner {
    endpoint: String,
    session_id: String,
    policy: ReconnectPolicy,
    connect_grace: Duration,
    keepalive_interval: Duration,
    keepalive_factor: u32,
    store: SessionStore,
    events_tx: mpsc::Sender<ReconcilerInput>,
    cancel: CancellationToken,
    commands: mpsc::Receiver<ChannelCommand>,
    attempts: u32,
    saw_terminal: bool,
}

impl ChannelRunner {
    async fn run(mut self) {
        // Grace window between snapshot bootstrap and the first connect.
        if !self.sleep_unless_cancelled(self.connect_grace).await {
            return;
        }

        loop {
            self.publish(ConnectionState::Connecting, None).await;
            tracing::debug!(
                session_id = %self.session_id,
                attempt = self.attempts,
                "connecting push channel"
            );

            let cause = match self.connect().await {
                Ok(ws) => {
                    self.attempts = 0;
                    self.publish(ConnectionState::Connected, None).await;
                    tracing::info!(session_id = %self.session_id, "push channel open");
                    let (sink, stream) = ws.split();
                    match self.drive(sink, stream).await {
                        // Locally requested close; teardown is complete.
                        None => {
                            self.publish(ConnectionState::Disconnected, None).await;
                            return;
                        }
                        Some(cause) => cause,
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        session_id = %self.session_id,
                        error = %err,
                        "push channel connect failed"
                    );
                    CloseCause::TransportError
                }
            };

            self.attempts += 1;
            let terminal = self.saw_terminal || self.store.snapshot().is_terminal();
            match self.policy.decide(cause, self.attempts, terminal, false) {
                ReconnectDecision::Stop => {
                    tracing::info!(
                        session_id = %self.session_id,
                        cause = ?cause,
                        "push channel done"
                    );
                    self.attempts = 0;
                    self.publish(ConnectionState::Disconnected, None).await;
                    return;
                }
                ReconnectDecision::GiveUp => {
                    tracing::warn!(
                        session_id = %self.session_id,
                        attempts = self.attempts,
                        "reconnect budget exhausted"
                    );
                    self.publish(ConnectionState::PermanentlyFailed, None).await;
                    if !self.await_manual_retry().await {
                        return;
                    }
                }
                ReconnectDecision::RetryAfter(delay) => {
                    let next_retry_at = Utc::now()
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::seconds(0));
                    tracing::info!(
                        session_id = %self.session_id,
                        cause = ?cause,
                        attempt = self.attempts,
                        delay_ms = delay.as_millis() as u64,
                        "scheduling reconnect"
                    );
                    self.publish(ConnectionState::Connecting, Some(next_retry_at))
                        .await;
                    if !self.sleep_unless_cancelled(delay).await {
                        self.publish(ConnectionState::Disconnected, None).await;
                        return;
                    }
                }
            }
        }
    }

    async fn connect(
        &self,
    ) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, ChannelError> {
        let (ws, _response) = connect_async(&self.endpoint).await?;
        Ok(ws)
    }

    /// Pump one open connection. Returns the close cause, or `None` when
    /// the close was requested locally.
    async fn drive(&mut self, mut sink: WsSink, mut stream: WsStream) -> Option<CloseCause> {
        // The server expects an opening acknowledgement frame.
        if let Err(err) = sink
            .send(Message::Text(Keepalive::pong_frame().into()))
            .await
        {
            tracing::warn!(session_id = %self.session_id, error = %err, "hello frame failed");
            return Some(CloseCause::TransportError);
        }

        let mut keepalive = Keepalive::new(self.keepalive_interval, self.keepalive_factor);
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client closing".into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    return None;
                }
                () = tokio::time::sleep_until(keepalive.deadline()) => {
                    tracing::warn!(
                        session_id = %self.session_id,
                        "liveness deadline passed, forcing reconnect"
                    );
                    return Some(CloseCause::Abnormal(None));
                }
                frame = stream.next() => {
                    keepalive.touch();
                    match frame {
                        None => return Some(CloseCause::Abnormal(None)),
                        Some(Err(err)) => {
                            tracing::warn!(
                                session_id = %self.session_id,
                                error = %err,
                                "push channel transport error"
                            );
                            return Some(CloseCause::TransportError);
                        }
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(text.as_str(), &mut sink).await;
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = sink.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let code = frame.as_ref().map(|f| u16::from(f.code));
                            tracing::info!(
                                session_id = %self.session_id,
                                close_code = ?code,
                                "push channel closed by server"
                            );
                            return Some(CloseCause::from_close_code(code));
                        }
                        Some(Ok(_)) => {}
                    }
                }
            }
        }
    }

    async fn handle_text(&mut self, text: &str, sink: &mut WsSink) {
        let event: PushEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    error = %err,
                    "dropping malformed push frame"
                );
                return;
            }
        };
        match event {
            PushEvent::Ping { .. } => {
                let _ = sink
                    .send(Message::Text(Keepalive::pong_frame().into()))
                    .await;
            }
            PushEvent::Pong { .. } => {}
            event => {
                if event.is_terminal() {
                    self.saw_terminal = true;
                }
                if self
                    .events_tx
                    .send(ReconcilerInput::Event(event))
                    .await
                    .is_err()
                {
                    tracing::debug!(session_id = %self.session_id, "reconciler queue closed");
                }
            }
        }
    }

    /// Park in `PermanentlyFailed` until a retry command. Returns `false`
    /// on teardown.
    async fn await_manual_retry(&mut self) -> bool {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return false,
                command = self.commands.recv() => match command {
                    Some(ChannelCommand::Retry) => {
                        tracing::info!(session_id = %self.session_id, "manual reconnect requested");
                        self.attempts = 0;
                        return true;
                    }
                    None => return false,
                },
            }
        }
    }

    /// Wait out a delay, unless cancelled. A manual retry command
    /// short-circuits the wait.
    async fn sleep_unless_cancelled(&mut self, delay: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + delay;
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep_until(deadline) => true,
            command = self.commands.recv() => match command {
                Some(ChannelCommand::Retry) => {
                    self.attempts = 0;
                    true
                }
                // Command sender gone; finish the wait normally.
                None => tokio::select! {
                    () = self.cancel.cancelled() => false,
                    () = tokio::time::sleep_until(deadline) => true,
                },
            },
        }
    }

    async fn publish(&self, state: ConnectionState, next_retry_at: Option<DateTime<Utc>>) {
        let info = ConnectionInfo {
            state,
            attempt_count: self.attempts,
            next_retry_at,
        };
        if self
            .events_tx
            .send(ReconcilerInput::Connectivity(info))
            .await
            .is_err()
        {
            tracing::debug!(session_id = %self.session_id, "reconciler queue closed");
        }
    }
}
