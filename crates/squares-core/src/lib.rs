//! # squares-core
//!
//! Foundation types for the squares realtime backend.
//!
//! This crate provides the shared vocabulary that the bus, server and binary
//! crates depend on:
//!
//! - **Branded IDs**: `ContestId`, `SquareId`, `ConnectionId` as UUID newtypes
//! - **Envelope**: the wire-level realtime event record and its closed set of kinds
//! - **Claims**: the authorization snapshot captured when a socket is accepted
//! - **Logging**: `tracing` subscriber initialization

#![deny(unsafe_code)]

pub mod claims;
pub mod constants;
pub mod envelope;
pub mod ids;
pub mod logging;

pub use claims::Claims;
pub use envelope::{Envelope, EnvelopeKind};
pub use ids::{ConnectionId, ContestId, SquareId};
