//! `GET /ws/contests/{contest_id}` upgrade handler.
//!
//! Browsers cannot set headers on a WebSocket handshake, so the bearer token
//! rides in `Sec-WebSocket-Protocol` and is echoed back as the negotiated
//! subprotocol. Verification, the contest gate and the capacity check all
//! happen before the upgrade; a rejected request never reaches a session.
//! Capacity is a semaphore permit taken at admission and held by the session
//! task, so concurrent handshakes cannot overshoot `max_connections`.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::http::header::SEC_WEBSOCKET_PROTOCOL;
use axum::response::Response;
use metrics::counter;
use squares_core::{Claims, ConnectionId, ContestId};
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, info, warn};

use super::session::{SessionParams, run_ws_session};
use crate::auth::AuthError;
use crate::errors::HandshakeError;
use crate::metrics::WS_HANDSHAKE_REJECTIONS_TOTAL;
use crate::server::AppState;

/// First non-empty value offered in `Sec-WebSocket-Protocol`.
pub fn offered_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SEC_WEBSOCKET_PROTOCOL)?
        .to_str()
        .ok()?
        .split(',')
        .map(str::trim)
        .find(|p| !p.is_empty())
}

/// Verify, gate and upgrade.
pub async fn contest_ws_handler(
    ws: WebSocketUpgrade,
    Path(contest_id): Path<ContestId>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Response, HandshakeError> {
    match admit(&headers, contest_id, &state).await {
        Ok(Admission {
            token,
            claims,
            slot,
        }) => {
            let connection_id = ConnectionId::new();
            info!(%contest_id, %connection_id, sub = %claims.sub, "upgrading viewer");
            let params = SessionParams {
                connection_id,
                contest_id,
                claims: Some(claims),
            };
            let deps = state.session_deps();
            Ok(ws
                .protocols([token])
                .max_message_size(state.config.max_message_size)
                .on_upgrade(move |socket| async move {
                    let reason = run_ws_session(socket, params, deps).await;
                    drop(slot);
                    debug!(%connection_id, %reason, "session task finished");
                }))
        }
        Err(e) => {
            counter!(WS_HANDSHAKE_REJECTIONS_TOTAL, "code" => e.code()).increment(1);
            warn!(%contest_id, error = %e, "realtime handshake rejected");
            Err(e)
        }
    }
}

/// A handshake that passed every check, holding its connection slot.
#[derive(Debug)]
pub(crate) struct Admission {
    token: String,
    claims: Claims,
    slot: OwnedSemaphorePermit,
}

pub(crate) async fn admit(
    headers: &HeaderMap,
    contest_id: ContestId,
    state: &AppState,
) -> Result<Admission, HandshakeError> {
    let token = offered_token(headers).ok_or(AuthError::MissingToken)?;
    let claims = state.verifier.verify(token)?;
    state.gate.admit(&contest_id, &claims).await?;
    let slot = Arc::clone(&state.slots)
        .try_acquire_owned()
        .map_err(|_| HandshakeError::Capacity)?;
    Ok(Admission {
        token: token.to_owned(),
        claims,
        slot,
    })
}
