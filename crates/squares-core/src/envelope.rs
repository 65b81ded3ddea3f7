//! The realtime wire envelope.
//!
//! Every realtime event, whether relayed over the bus or written directly to a
//! client socket, is one [`Envelope`] serialized as field-keyed JSON:
//!
//! ```json
//! {
//!   "type": "square-update",
//!   "contestId": "0192b0c4-...",
//!   "squareId": "0192b0c5-...",
//!   "value": "X1",
//!   "updatedBy": "alice",
//!   "timestamp": 1767225600
//! }
//! ```
//!
//! Field names and the `type` strings are a durable contract shared by every
//! backend process and every client. Optional fields are omitted when absent.

use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::constants::SYSTEM_ACTOR;
use crate::ids::{ConnectionId, ContestId, SquareId};

/// Closed set of realtime event kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvelopeKind {
    /// Sent directly to a client right after its session starts.
    Connected,
    /// A square was claimed or changed.
    SquareUpdate,
    /// Contest lifecycle change (status transition or deletion).
    ContestUpdate,
    /// A quarter result was recorded.
    QuarterResultUpdate,
    /// Sent directly to a client right before the server closes its session.
    Disconnected,
    /// Application-level liveness marker for clients that cannot see pings.
    Keepalive,
}

impl EnvelopeKind {
    /// Wire string for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::SquareUpdate => "square-update",
            Self::ContestUpdate => "contest-update",
            Self::QuarterResultUpdate => "quarter-result-update",
            Self::Disconnected => "disconnected",
            Self::Keepalive => "keepalive",
        }
    }
}

impl std::fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One realtime event.
///
/// Built through the per-kind constructors, which stamp the server time.
/// Fields are public for reading; nothing mutates an envelope after it is
/// built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    /// Contest the event belongs to.
    pub contest_id: ContestId,
    /// Square the event refers to (square updates, winning square of a quarter).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub square_id: Option<SquareId>,
    /// Event value: square owner, contest status, quarter score, close reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Quarter number (1-4, 5 for overtime) for quarter results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quarter: Option<u8>,
    /// Connection the event is addressed to (connected / disconnected only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<ConnectionId>,
    /// Identity that caused the event, or `"system"`.
    pub updated_by: String,
    /// Server time the envelope was built, Unix epoch seconds.
    pub timestamp: i64,
}

impl Envelope {
    fn base(kind: EnvelopeKind, contest_id: ContestId, updated_by: impl Into<String>) -> Self {
        Self {
            kind,
            contest_id,
            square_id: None,
            value: None,
            quarter: None,
            connection_id: None,
            updated_by: updated_by.into(),
            timestamp: Utc::now().timestamp(),
        }
    }

    /// Greeting written directly to a freshly accepted client.
    #[must_use]
    pub fn connected(contest_id: ContestId, connection_id: ConnectionId) -> Self {
        Self {
            connection_id: Some(connection_id),
            ..Self::base(EnvelopeKind::Connected, contest_id, SYSTEM_ACTOR)
        }
    }

    /// A square was claimed (or released) with the given value.
    #[must_use]
    pub fn square_update(
        contest_id: ContestId,
        square_id: SquareId,
        value: impl Into<String>,
        updated_by: impl Into<String>,
    ) -> Self {
        Self {
            square_id: Some(square_id),
            value: Some(value.into()),
            ..Self::base(EnvelopeKind::SquareUpdate, contest_id, updated_by)
        }
    }

    /// The contest moved to a new status (`value` carries the status).
    #[must_use]
    pub fn contest_update(
        contest_id: ContestId,
        status: impl Into<String>,
        updated_by: impl Into<String>,
    ) -> Self {
        Self {
            value: Some(status.into()),
            ..Self::base(EnvelopeKind::ContestUpdate, contest_id, updated_by)
        }
    }

    /// A quarter result was recorded.
    #[must_use]
    pub fn quarter_result_update(
        contest_id: ContestId,
        quarter: u8,
        winning_square: Option<SquareId>,
        result: Option<String>,
        updated_by: impl Into<String>,
    ) -> Self {
        Self {
            quarter: Some(quarter),
            square_id: winning_square,
            value: result,
            ..Self::base(EnvelopeKind::QuarterResultUpdate, contest_id, updated_by)
        }
    }

    /// Farewell written directly to a client before its session is closed.
    #[must_use]
    pub fn disconnected(
        contest_id: ContestId,
        connection_id: ConnectionId,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            connection_id: Some(connection_id),
            value: Some(reason.into()),
            ..Self::base(EnvelopeKind::Disconnected, contest_id, SYSTEM_ACTOR)
        }
    }

    /// Application-level keepalive.
    #[must_use]
    pub fn keepalive(contest_id: ContestId) -> Self {
        Self::base(EnvelopeKind::Keepalive, contest_id, SYSTEM_ACTOR)
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Serialize to JSON bytes for the bus.
    pub fn to_bytes(&self) -> serde_json::Result<Bytes> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    /// Parse an envelope from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn kind_wire_strings() {
        let cases = [
            (EnvelopeKind::Connected, "connected"),
            (EnvelopeKind::SquareUpdate, "square-update"),
            (EnvelopeKind::ContestUpdate, "contest-update"),
            (EnvelopeKind::QuarterResultUpdate, "quarter-result-update"),
            (EnvelopeKind::Disconnected, "disconnected"),
            (EnvelopeKind::Keepalive, "keepalive"),
        ];
        for (kind, wire) in cases {
            assert_eq!(kind.as_str(), wire);
            assert_eq!(serde_json::to_value(kind).unwrap(), Value::String(wire.into()));
        }
    }

    #[test]
    fn square_update_wire_shape() {
        let contest = ContestId::new();
        let square = SquareId::new();
        let env = Envelope::square_update(contest, square, "X1", "alice");
        let v: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();

        assert_eq!(v["type"], "square-update");
        assert_eq!(v["contestId"], contest.to_string());
        assert_eq!(v["squareId"], square.to_string());
        assert_eq!(v["value"], "X1");
        assert_eq!(v["updatedBy"], "alice");
        assert!(v["timestamp"].is_i64());
        assert!(v.get("quarter").is_none());
        assert!(v.get("connectionId").is_none());
    }

    #[test]
    fn roundtrip_preserves_identifying_fields() {
        let env = Envelope::quarter_result_update(
            ContestId::new(),
            3,
            Some(SquareId::new()),
            Some("17-14".into()),
            "scorekeeper",
        );
        let back = Envelope::from_slice(&env.to_bytes().unwrap()).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn connected_carries_connection_id() {
        let conn = ConnectionId::new();
        let env = Envelope::connected(ContestId::new(), conn);
        assert_eq!(env.kind, EnvelopeKind::Connected);
        assert_eq!(env.connection_id, Some(conn));
        assert_eq!(env.updated_by, SYSTEM_ACTOR);
    }

    #[test]
    fn disconnected_carries_reason() {
        let env = Envelope::disconnected(ContestId::new(), ConnectionId::new(), "claims_expired");
        assert_eq!(env.kind, EnvelopeKind::Disconnected);
        assert_eq!(env.value.as_deref(), Some("claims_expired"));
    }

    #[test]
    fn contest_update_value_is_status() {
        let env = Envelope::contest_update(ContestId::new(), "Q2", "admin");
        assert_eq!(env.value.as_deref(), Some("Q2"));
        assert!(env.square_id.is_none());
    }

    #[test]
    fn keepalive_is_minimal() {
        let env = Envelope::keepalive(ContestId::new());
        let v: Value = serde_json::to_value(&env).unwrap();
        let obj = v.as_object().unwrap();
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["contestId", "timestamp", "type", "updatedBy"]);
    }

    #[test]
    fn timestamp_is_current() {
        let before = Utc::now().timestamp();
        let env = Envelope::keepalive(ContestId::new());
        let after = Utc::now().timestamp();
        assert!(env.timestamp >= before && env.timestamp <= after);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let json = format!(
            r#"{{"type":"square-claimed","contestId":"{}","updatedBy":"a","timestamp":1}}"#,
            ContestId::new()
        );
        assert!(Envelope::from_slice(json.as_bytes()).is_err());
    }

    #[test]
    fn malformed_bytes_are_rejected() {
        assert!(Envelope::from_slice(b"not json").is_err());
        assert!(Envelope::from_slice(b"{}").is_err());
    }
}
