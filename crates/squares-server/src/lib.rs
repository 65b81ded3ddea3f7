//! # squares-server
//!
//! Axum HTTP + `WebSocket` server that streams contest updates to viewers.
//!
//! - `GET /ws/contests/{contestId}`: token-in-subprotocol handshake, contest
//!   gate, then one connection session per viewer
//! - Sessions relay the contest's bus topic to the socket, ping for
//!   liveness, and periodically revalidate the caller's claims
//! - `GET /health` and `GET /metrics` (Prometheus)
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod errors;
pub mod gate;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use auth::{AuthError, JwtVerifier, TokenVerifier};
pub use config::ServerConfig;
pub use errors::HandshakeError;
pub use gate::{ContestAccess, ContestGate, GateRejection, OpenGate, StaticGate};
pub use server::{AppState, SquaresServer};
pub use websocket::CloseReason;
