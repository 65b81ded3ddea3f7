//! Contest admission gate applied at handshake time.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use squares_core::{Claims, ContestId};
use thiserror::Error;

/// Why a viewer was refused a contest.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GateRejection {
    /// No such contest.
    #[error("contest not found")]
    NotFound,
    /// The contest no longer accepts viewers.
    #[error("contest is {0}")]
    Closed(String),
    /// The caller lacks the group the contest requires.
    #[error("not permitted to view this contest")]
    Forbidden,
}

/// Decides whether an authenticated caller may watch a contest.
#[async_trait]
pub trait ContestGate: Send + Sync {
    /// `Ok(())` admits the caller.
    async fn admit(&self, contest_id: &ContestId, claims: &Claims) -> Result<(), GateRejection>;
}

/// Admits every verified caller to every contest.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenGate;

#[async_trait]
impl ContestGate for OpenGate {
    async fn admit(&self, _contest_id: &ContestId, _claims: &Claims) -> Result<(), GateRejection> {
        Ok(())
    }
}

/// Admission rule for one contest in a [`StaticGate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContestAccess {
    /// Anyone with a valid token.
    Open,
    /// Members of the named group only.
    Restricted(String),
    /// Nobody; carries the contest status for the rejection message.
    Closed(String),
}

/// In-memory table of contests and their admission rules.
#[derive(Debug, Default)]
pub struct StaticGate {
    contests: RwLock<HashMap<ContestId, ContestAccess>>,
}

impl StaticGate {
    /// Empty table (every contest is unknown).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rule for `contest_id`.
    pub fn set(&self, contest_id: ContestId, access: ContestAccess) {
        let _ = self.contests.write().insert(contest_id, access);
    }

    /// Forget `contest_id`.
    pub fn remove(&self, contest_id: &ContestId) {
        let _ = self.contests.write().remove(contest_id);
    }
}

#[async_trait]
impl ContestGate for StaticGate {
    async fn admit(&self, contest_id: &ContestId, claims: &Claims) -> Result<(), GateRejection> {
        match self.contests.read().get(contest_id) {
            None => Err(GateRejection::NotFound),
            Some(ContestAccess::Open) => Ok(()),
            Some(ContestAccess::Restricted(group)) if claims.in_group(group) => Ok(()),
            Some(ContestAccess::Restricted(_)) => Err(GateRejection::Forbidden),
            Some(ContestAccess::Closed(status)) => Err(GateRejection::Closed(status.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn claims(groups: &[&str]) -> Claims {
        Claims::new("alice", Utc::now() + Duration::minutes(5)).with_groups(groups.iter().copied())
    }

    #[tokio::test]
    async fn open_gate_admits_anything() {
        assert!(OpenGate.admit(&ContestId::new(), &claims(&[])).await.is_ok());
    }

    #[tokio::test]
    async fn unknown_contest_not_found() {
        let gate = StaticGate::new();
        assert_eq!(
            gate.admit(&ContestId::new(), &claims(&[])).await,
            Err(GateRejection::NotFound)
        );
    }

    #[tokio::test]
    async fn open_contest_admits() {
        let gate = StaticGate::new();
        let id = ContestId::new();
        gate.set(id, ContestAccess::Open);
        assert!(gate.admit(&id, &claims(&[])).await.is_ok());
    }

    #[tokio::test]
    async fn restricted_contest_checks_group() {
        let gate = StaticGate::new();
        let id = ContestId::new();
        gate.set(id, ContestAccess::Restricted("league-7".into()));
        assert!(gate.admit(&id, &claims(&["league-7"])).await.is_ok());
        assert_eq!(
            gate.admit(&id, &claims(&["league-8"])).await,
            Err(GateRejection::Forbidden)
        );
    }

    #[tokio::test]
    async fn closed_contest_reports_status() {
        let gate = StaticGate::new();
        let id = ContestId::new();
        gate.set(id, ContestAccess::Closed("deleted".into()));
        let err = gate.admit(&id, &claims(&[])).await.unwrap_err();
        assert_eq!(err.to_string(), "contest is deleted");
    }

    #[tokio::test]
    async fn removed_contest_is_unknown() {
        let gate = StaticGate::new();
        let id = ContestId::new();
        gate.set(id, ContestAccess::Open);
        gate.remove(&id);
        assert_eq!(gate.admit(&id, &claims(&[])).await, Err(GateRejection::NotFound));
    }
}
