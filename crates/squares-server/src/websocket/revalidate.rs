//! Periodic claims revalidation.
//!
//! Only the snapshot's expiry is re-checked. Signature, issuer and
//! revocation are not re-verified after the handshake; plug a different
//! [`ClaimsExpiry`] in to change that.

use chrono::{DateTime, Utc};
use squares_core::Claims;

/// "Have these claims expired?" predicate.
pub trait ClaimsExpiry: Send + Sync {
    /// Whether `claims` should no longer be honoured at `now`.
    fn is_expired(&self, claims: &Claims, now: DateTime<Utc>) -> bool;
}

/// Compares the snapshot's `exp` to the clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SnapshotExpiry;

impl ClaimsExpiry for SnapshotExpiry {
    fn is_expired(&self, claims: &Claims, now: DateTime<Utc>) -> bool {
        claims.is_expired(now)
    }
}

/// Outcome of one revalidation tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Revalidation {
    /// Keep the session.
    Valid,
    /// The session never had claims.
    Missing,
    /// The claims have expired.
    Expired,
}

/// Re-check a session's claims snapshot.
pub fn revalidate(
    claims: Option<&Claims>,
    expiry: &dyn ClaimsExpiry,
    now: DateTime<Utc>,
) -> Revalidation {
    match claims {
        None => Revalidation::Missing,
        Some(c) if expiry.is_expired(c, now) => Revalidation::Expired,
        Some(_) => Revalidation::Valid,
    }
}
