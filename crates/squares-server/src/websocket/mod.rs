//! Realtime contest sessions: handshake, liveness, revalidation, lifecycle.

pub mod liveness;
pub mod reason;
pub mod registry;
pub mod revalidate;
pub mod session;
pub mod upgrade;

pub use reason::CloseReason;
pub use registry::SessionRegistry;
pub use revalidate::{ClaimsExpiry, SnapshotExpiry};
pub use session::{SessionConfig, SessionDeps, SessionParams, run_session, run_ws_session};
