//! Authorization snapshot captured when a realtime connection is accepted.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Verified token claims.
///
/// Deserialized straight from the JWT payload at handshake time and never
/// modified afterwards. Revalidation only compares `exp` against the clock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user identity).
    pub sub: String,
    /// Expiration time, Unix epoch seconds.
    pub exp: i64,
    /// Issued-at time, Unix epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Authorized groups / roles.
    #[serde(default)]
    pub groups: Vec<String>,
}

impl Claims {
    /// Build a claims snapshot for `sub` expiring at `expires_at`.
    pub fn new(sub: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            sub: sub.into(),
            exp: expires_at.timestamp(),
            iat: Some(Utc::now().timestamp()),
            groups: Vec::new(),
        }
    }

    /// Attach authorized groups.
    #[must_use]
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Expiry as a timestamp, if representable.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }

    /// Whether the snapshot has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }

    /// Whether the holder belongs to `group`.
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}
