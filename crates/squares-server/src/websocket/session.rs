//! Connection session: one viewer's socket, from acceptance to close.
//!
//! Two tasks share a cancellation token and a [`Liveness`]:
//!
//! - **outbound** (the caller's task) is the only writer. It waits on
//!   shutdown, the revalidation tick, the ping tick and the contest's bus
//!   subscription, first ready first handled.
//! - **inbound** (spawned) reads client frames. It records pongs, enforces
//!   the read deadline and notices the peer going away. It never writes.
//!
//! Whichever side hits a terminal condition first records its
//! [`CloseReason`] and cancels the other. Cleanup (registry, subscription,
//! inbound task, gauges) runs exactly once from a drop guard.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use chrono::Utc;
use futures::{Sink, SinkExt, Stream, StreamExt};
use metrics::{counter, gauge, histogram};
use squares_bus::{Bus, Subscription, contest_topic};
use squares_core::{Claims, ConnectionId, ContestId, Envelope};
use squares_settings::RealtimeSettings;
use thiserror::Error;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, instrument, trace, warn};

use super::liveness::Liveness;
use super::reason::CloseReason;
use super::registry::SessionRegistry;
use super::revalidate::{ClaimsExpiry, Revalidation, revalidate};
use crate::metrics::{
    ENVELOPE_DECODE_FAILURES_TOTAL, ENVELOPES_DELIVERED_TOTAL, WS_CONNECTION_DURATION_SECONDS,
    WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL,
};

/// Session timers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Time between server pings.
    pub ping_interval: Duration,
    /// Deadline for any single write.
    pub write_wait: Duration,
    /// Read deadline, extended by every pong.
    pub pong_wait: Duration,
    /// Time between claims revalidations.
    pub revalidate_interval: Duration,
    /// Also write a `keepalive` envelope on each ping tick.
    pub keepalive_envelopes: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&RealtimeSettings::default())
    }
}

impl From<&RealtimeSettings> for SessionConfig {
    fn from(rt: &RealtimeSettings) -> Self {
        Self {
            ping_interval: rt.ping_interval(),
            write_wait: rt.write_wait(),
            pong_wait: rt.pong_wait(),
            revalidate_interval: rt.revalidate_interval(),
            keepalive_envelopes: rt.keepalive_envelopes,
        }
    }
}

/// Who the session is for.
#[derive(Clone, Debug)]
pub struct SessionParams {
    /// Generated per session.
    pub connection_id: ConnectionId,
    /// The one contest this session watches.
    pub contest_id: ContestId,
    /// Snapshot taken at handshake.
    pub claims: Option<Claims>,
}

/// What the session runs against.
#[derive(Clone)]
pub struct SessionDeps {
    /// Source of contest updates.
    pub bus: Arc<dyn Bus>,
    /// Revalidation predicate.
    pub expiry: Arc<dyn ClaimsExpiry>,
    /// Live session bookkeeping.
    pub registry: Arc<SessionRegistry>,
    /// Parent token; the session runs on a child of it.
    pub shutdown: CancellationToken,
    /// Timers.
    pub config: SessionConfig,
}

#[derive(Debug, Error)]
enum WriteError {
    #[error("write deadline exceeded")]
    Timeout,
    #[error("{0}")]
    Transport(String),
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Run a session over an axum WebSocket.
pub async fn run_ws_session(
    socket: WebSocket,
    params: SessionParams,
    deps: SessionDeps,
) -> CloseReason {
    let (tx, rx) = socket.split();
    run_session(tx, rx, params, deps).await
}

/// Run a session over any message sink/stream pair until a terminal
/// condition fires. Returns the condition that won.
#[instrument(skip_all, fields(connection_id = %params.connection_id, contest_id = %params.contest_id))]
pub async fn run_session<Tx, Rx, E>(
    mut tx: Tx,
    rx: Rx,
    params: SessionParams,
    deps: SessionDeps,
) -> CloseReason
where
    Tx: Sink<Message> + Unpin + Send,
    Tx::Error: fmt::Display,
    Rx: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let session = Session {
        connection_id: params.connection_id,
        contest_id: params.contest_id,
        claims: params.claims,
        expiry: deps.expiry,
        config: deps.config,
    };
    let topic = contest_topic(&session.contest_id);

    let mut subscription = match deps.bus.subscribe(&topic).await {
        Ok(sub) => sub,
        Err(e) => {
            warn!(topic, error = %e, "contest subscribe failed");
            let reason = CloseReason::SubscribeFailed;
            session.finish(&mut tx, reason).await;
            counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
            return reason;
        }
    };

    let cancel = deps.shutdown.child_token();
    let shared = Arc::new(Shared {
        liveness: Liveness::new(session.config.pong_wait),
        exit: OnceLock::new(),
        cancel: cancel.clone(),
    });

    deps.registry.add(session.connection_id, session.contest_id);
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
    info!(topic, "viewer connected");

    let inbound = tokio::spawn(drain_inbound(rx, Arc::clone(&shared)).in_current_span());
    let _guard = SessionGuard {
        registry: deps.registry,
        connection_id: session.connection_id,
        cancel,
        inbound: inbound.abort_handle(),
        started: std::time::Instant::now(),
    };

    let greeting = Envelope::connected(session.contest_id, session.connection_id);
    let reason = match session.write_envelope(&mut tx, &greeting).await {
        Ok(()) => session.outbound(&mut tx, &mut subscription, &shared).await,
        Err(e) => {
            warn!(error = %e, "connected envelope write failed");
            shared.terminate(CloseReason::WriteFailed)
        }
    };
    session.finish(&mut tx, reason).await;

    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason.as_str()).increment(1);
    info!(reason = %reason, "viewer disconnected");
    reason
}

struct Session {
    connection_id: ConnectionId,
    contest_id: ContestId,
    claims: Option<Claims>,
    expiry: Arc<dyn ClaimsExpiry>,
    config: SessionConfig,
}

impl Session {
    async fn outbound<Tx>(
        &self,
        tx: &mut Tx,
        subscription: &mut Subscription,
        shared: &Shared,
    ) -> CloseReason
    where
        Tx: Sink<Message> + Unpin,
        Tx::Error: fmt::Display,
    {
        let start = Instant::now();
        let mut ping = interval_at(start + self.config.ping_interval, self.config.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut recheck = interval_at(
            start + self.config.revalidate_interval,
            self.config.revalidate_interval,
        );
        recheck.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                () = shared.cancel.cancelled() => {
                    return shared.terminate(CloseReason::Shutdown);
                }
                _ = recheck.tick() => {
                    match revalidate(self.claims.as_ref(), self.expiry.as_ref(), Utc::now()) {
                        Revalidation::Valid => trace!("claims still valid"),
                        Revalidation::Missing => {
                            warn!("session has no claims");
                            return shared.terminate(CloseReason::ClaimsMissing);
                        }
                        Revalidation::Expired => {
                            warn!(exp = self.claims.as_ref().map(|c| c.exp), "claims expired");
                            return shared.terminate(CloseReason::ClaimsExpired);
                        }
                    }
                }
                _ = ping.tick() => {
                    if let Err(e) = self.write(tx, Message::Ping(Vec::new().into())).await {
                        warn!(error = %e, "ping write failed");
                        return shared.terminate(CloseReason::PingFailed);
                    }
                    if self.config.keepalive_envelopes {
                        let keepalive = Envelope::keepalive(self.contest_id);
                        if let Err(e) = self.write_envelope(tx, &keepalive).await {
                            warn!(error = %e, "keepalive write failed");
                            return shared.terminate(CloseReason::WriteFailed);
                        }
                    }
                }
                item = subscription.next() => {
                    let Some(payload) = item else {
                        warn!(topic = subscription.topic(), "bus subscription ended");
                        return shared.terminate(CloseReason::BusClosed);
                    };
                    if let Err(e) = self.deliver(tx, &payload).await {
                        warn!(error = %e, "envelope write failed");
                        return shared.terminate(CloseReason::WriteFailed);
                    }
                }
            }
        }
    }

    /// Decode one bus payload and forward it. Undecodable payloads and
    /// envelopes for other contests are dropped.
    async fn deliver<Tx>(&self, tx: &mut Tx, payload: &[u8]) -> Result<(), WriteError>
    where
        Tx: Sink<Message> + Unpin,
        Tx::Error: fmt::Display,
    {
        let envelope = match Envelope::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                counter!(ENVELOPE_DECODE_FAILURES_TOTAL).increment(1);
                warn!(error = %e, len = payload.len(), "dropping undecodable bus payload");
                return Ok(());
            }
        };
        if envelope.contest_id != self.contest_id {
            warn!(envelope_contest = %envelope.contest_id, "dropping envelope for another contest");
            return Ok(());
        }

        self.write_envelope(tx, &envelope).await?;
        counter!(ENVELOPES_DELIVERED_TOTAL, "type" => envelope.kind.as_str()).increment(1);
        debug!(kind = %envelope.kind, "envelope delivered");
        Ok(())
    }

    /// Best-effort farewell: optional `disconnected` envelope, optional
    /// close frame, then close the sink.
    async fn finish<Tx>(&self, tx: &mut Tx, reason: CloseReason)
    where
        Tx: Sink<Message> + Unpin,
        Tx::Error: fmt::Display,
    {
        if reason.notifies_client() {
            let farewell =
                Envelope::disconnected(self.contest_id, self.connection_id, reason.as_str());
            if let Err(e) = self.write_envelope(tx, &farewell).await {
                debug!(error = %e, "disconnected envelope not delivered");
            }
        }
        if let Some((code, text)) = reason.close_frame() {
            let frame = Message::Close(Some(CloseFrame {
                code,
                reason: Utf8Bytes::from_static(text),
            }));
            if let Err(e) = self.write(tx, frame).await {
                debug!(error = %e, "close frame not delivered");
            }
        }
        let _ = timeout(self.config.write_wait, tx.close()).await;
    }

    async fn write_envelope<Tx>(&self, tx: &mut Tx, envelope: &Envelope) -> Result<(), WriteError>
    where
        Tx: Sink<Message> + Unpin,
        Tx::Error: fmt::Display,
    {
        let text = envelope.to_json()?;
        self.write(tx, Message::Text(text.into())).await
    }

    async fn write<Tx>(&self, tx: &mut Tx, message: Message) -> Result<(), WriteError>
    where
        Tx: Sink<Message> + Unpin,
        Tx::Error: fmt::Display,
    {
        match timeout(self.config.write_wait, tx.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(WriteError::Transport(e.to_string())),
            Err(_) => Err(WriteError::Timeout),
        }
    }
}

/// State both tasks of one session touch.
struct Shared {
    liveness: Liveness,
    exit: OnceLock<CloseReason>,
    cancel: CancellationToken,
}

impl Shared {
    /// Record `reason` unless another one got there first, cancel the
    /// session, and return the winning reason.
    fn terminate(&self, reason: CloseReason) -> CloseReason {
        let _ = self.exit.set(reason);
        self.cancel.cancel();
        self.exit.get().copied().unwrap_or(reason)
    }
}

/// Inbound loop: record pongs, enforce the read deadline, surface closure.
async fn drain_inbound<Rx, E>(mut rx: Rx, shared: Arc<Shared>)
where
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let reason = loop {
        let deadline = shared.liveness.read_deadline();
        tokio::select! {
            () = shared.cancel.cancelled() => return,
            () = sleep_until(deadline) => {
                if shared.liveness.is_expired(Instant::now()) {
                    warn!(
                        silent_secs = shared.liveness.last_pong().elapsed().as_secs(),
                        "read deadline passed without pong"
                    );
                    break CloseReason::LivenessTimeout;
                }
            }
            frame = rx.next() => match frame {
                Some(Ok(Message::Pong(_))) => {
                    trace!("pong");
                    shared.liveness.record_pong();
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "client sent close");
                    break CloseReason::PeerClosed;
                }
                Some(Ok(_)) => trace!("ignoring client frame"),
                Some(Err(e)) => {
                    debug!(error = %e, "read failed");
                    break CloseReason::ReadFailed;
                }
                None => break CloseReason::PeerClosed,
            },
        }
    };
    let _ = shared.terminate(reason);
}

/// Releases per-session resources on every exit path.
struct SessionGuard {
    registry: Arc<SessionRegistry>,
    connection_id: ConnectionId,
    cancel: CancellationToken,
    inbound: AbortHandle,
    started: std::time::Instant,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.inbound.abort();
        let _ = self.registry.remove(&self.connection_id);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(WS_CONNECTION_DURATION_SECONDS).record(self.started.elapsed().as_secs_f64());
    }
}
