//! Broadcast publisher.
//!
//! Mutation handlers call into this after their write commits. Each call is
//! exactly one serialize-and-send to the contest's topic: no buffering, no
//! retry. Whether a failure matters is the caller's decision.

use std::sync::Arc;

use metrics::counter;
use squares_core::{ContestId, Envelope, EnvelopeKind, SquareId};
use tracing::{debug, warn};

use crate::bus::{Bus, contest_topic};
use crate::errors::PublishError;

/// Status value carried by a contest deletion.
pub const DELETED_STATUS: &str = "deleted";

/// Publishes attempted.
pub const PUBLISHES_TOTAL: &str = "squares_publishes_total";
/// Publishes that failed.
pub const PUBLISH_FAILURES_TOTAL: &str = "squares_publish_failures_total";

/// What changed, for each mutation kind that fans out to viewers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventDetail {
    /// A square was claimed or cleared.
    SquareUpdate {
        /// The square.
        square_id: SquareId,
        /// Its new value (claimant initials, empty when cleared).
        value: String,
    },
    /// The contest changed status.
    ContestUpdate {
        /// New status.
        status: String,
    },
    /// A quarter result was recorded.
    QuarterResult {
        /// Quarter number, 1-based.
        quarter: u8,
        /// Winning square, if one was determined.
        square_id: Option<SquareId>,
        /// Score or result text.
        value: Option<String>,
    },
    /// The contest was deleted.
    ContestDeleted,
}

impl EventDetail {
    /// Envelope type this detail is published as.
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Self::SquareUpdate { .. } => EnvelopeKind::SquareUpdate,
            Self::ContestUpdate { .. } | Self::ContestDeleted => EnvelopeKind::ContestUpdate,
            Self::QuarterResult { .. } => EnvelopeKind::QuarterResultUpdate,
        }
    }

    /// Build the envelope for this detail.
    pub fn into_envelope(self, contest_id: ContestId, updated_by: &str) -> Envelope {
        match self {
            Self::SquareUpdate { square_id, value } => {
                Envelope::square_update(contest_id, square_id, value, updated_by)
            }
            Self::ContestUpdate { status } => {
                Envelope::contest_update(contest_id, status, updated_by)
            }
            Self::QuarterResult {
                quarter,
                square_id,
                value,
            } => Envelope::quarter_result_update(contest_id, quarter, square_id, value, updated_by),
            Self::ContestDeleted => Envelope::contest_update(contest_id, DELETED_STATUS, updated_by),
        }
    }
}

/// Stateless front door onto the bus for mutation handlers.
#[derive(Clone)]
pub struct Publisher {
    bus: Arc<dyn Bus>,
}

impl Publisher {
    /// Publish through `bus`.
    pub fn new(bus: Arc<dyn Bus>) -> Self {
        Self { bus }
    }

    /// Publish one envelope describing `detail` to the contest's topic.
    pub async fn publish(
        &self,
        contest_id: ContestId,
        updated_by: &str,
        detail: EventDetail,
    ) -> Result<(), PublishError> {
        let kind = detail.kind();
        let envelope = detail.into_envelope(contest_id, updated_by);
        counter!(PUBLISHES_TOTAL, "type" => kind.as_str()).increment(1);

        let result = self.send(&envelope).await;
        match &result {
            Ok(()) => debug!(contest_id = %contest_id, kind = %kind, updated_by, "published"),
            Err(e) => {
                counter!(PUBLISH_FAILURES_TOTAL, "type" => kind.as_str()).increment(1);
                warn!(contest_id = %contest_id, kind = %kind, error = %e, "publish failed");
            }
        }
        result
    }

    async fn send(&self, envelope: &Envelope) -> Result<(), PublishError> {
        let payload = envelope.to_bytes()?;
        self.bus
            .publish(&contest_topic(&envelope.contest_id), payload)
            .await?;
        Ok(())
    }

    /// A square was claimed or cleared.
    pub async fn publish_square_update(
        &self,
        contest_id: ContestId,
        square_id: SquareId,
        value: impl Into<String>,
        updated_by: &str,
    ) -> Result<(), PublishError> {
        let detail = EventDetail::SquareUpdate {
            square_id,
            value: value.into(),
        };
        self.publish(contest_id, updated_by, detail).await
    }

    /// The contest changed status.
    pub async fn publish_contest_update(
        &self,
        contest_id: ContestId,
        status: impl Into<String>,
        updated_by: &str,
    ) -> Result<(), PublishError> {
        let detail = EventDetail::ContestUpdate {
            status: status.into(),
        };
        self.publish(contest_id, updated_by, detail).await
    }

    /// A quarter result was recorded.
    pub async fn publish_quarter_result(
        &self,
        contest_id: ContestId,
        quarter: u8,
        winning_square: Option<SquareId>,
        result: Option<String>,
        updated_by: &str,
    ) -> Result<(), PublishError> {
        let detail = EventDetail::QuarterResult {
            quarter,
            square_id: winning_square,
            value: result,
        };
        self.publish(contest_id, updated_by, detail).await
    }

    /// The contest was deleted.
    pub async fn publish_contest_deleted(
        &self,
        contest_id: ContestId,
        updated_by: &str,
    ) -> Result<(), PublishError> {
        self.publish(contest_id, updated_by, EventDetail::ContestDeleted)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Subscription;
    use crate::errors::BusError;
    use crate::local::LocalBus;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::StreamExt;

    struct DownBus;

    #[async_trait]
    impl Bus for DownBus {
        async fn publish(&self, _topic: &str, _payload: Bytes) -> Result<(), BusError> {
            Err(BusError::Unavailable("connection refused".into()))
        }

        async fn subscribe(&self, _topic: &str) -> Result<Subscription, BusError> {
            Err(BusError::Unavailable("connection refused".into()))
        }

        fn close(&self) {}
    }

    async fn setup() -> (Arc<LocalBus>, Publisher, ContestId, Subscription) {
        let bus = Arc::new(LocalBus::default());
        let publisher = Publisher::new(bus.clone());
        let contest = ContestId::new();
        let sub = bus.subscribe(&contest_topic(&contest)).await.unwrap();
        (bus, publisher, contest, sub)
    }

    async fn next_envelope(sub: &mut Subscription) -> Envelope {
        let bytes = sub.next().await.unwrap();
        Envelope::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn square_update_arrives_with_identifying_fields() {
        let (_bus, publisher, contest, mut sub) = setup().await;
        let square = SquareId::new();
        let before = chrono::Utc::now().timestamp();

        publisher
            .publish_square_update(contest, square, "X1", "alice")
            .await
            .unwrap();

        let env = next_envelope(&mut sub).await;
        assert_eq!(env.kind, EnvelopeKind::SquareUpdate);
        assert_eq!(env.contest_id, contest);
        assert_eq!(env.square_id, Some(square));
        assert_eq!(env.value.as_deref(), Some("X1"));
        assert_eq!(env.updated_by, "alice");
        assert!(env.timestamp >= before);
    }

    #[tokio::test]
    async fn contest_update_carries_status() {
        let (_bus, publisher, contest, mut sub) = setup().await;
        publisher
            .publish_contest_update(contest, "ACTIVE", "owner")
            .await
            .unwrap();

        let env = next_envelope(&mut sub).await;
        assert_eq!(env.kind, EnvelopeKind::ContestUpdate);
        assert_eq!(env.value.as_deref(), Some("ACTIVE"));
        assert!(env.square_id.is_none());
    }

    #[tokio::test]
    async fn quarter_result_carries_quarter_and_winner() {
        let (_bus, publisher, contest, mut sub) = setup().await;
        let winner = SquareId::new();
        publisher
            .publish_quarter_result(contest, 2, Some(winner), Some("14-7".into()), "owner")
            .await
            .unwrap();

        let env = next_envelope(&mut sub).await;
        assert_eq!(env.kind, EnvelopeKind::QuarterResultUpdate);
        assert_eq!(env.quarter, Some(2));
        assert_eq!(env.square_id, Some(winner));
        assert_eq!(env.value.as_deref(), Some("14-7"));
    }

    #[tokio::test]
    async fn deletion_is_contest_update_with_deleted_status() {
        let (_bus, publisher, contest, mut sub) = setup().await;
        publisher
            .publish_contest_deleted(contest, "owner")
            .await
            .unwrap();

        let env = next_envelope(&mut sub).await;
        assert_eq!(env.kind, EnvelopeKind::ContestUpdate);
        assert_eq!(env.value.as_deref(), Some(DELETED_STATUS));
    }

    #[tokio::test]
    async fn publish_only_reaches_own_contest() {
        let (bus, publisher, _contest, mut sub) = setup().await;
        let other = ContestId::new();
        let mut other_sub = bus.subscribe(&contest_topic(&other)).await.unwrap();

        publisher
            .publish_contest_update(other, "LOCKED", "owner")
            .await
            .unwrap();

        assert_eq!(next_envelope(&mut other_sub).await.contest_id, other);
        let nothing =
            tokio::time::timeout(std::time::Duration::from_millis(50), sub.next()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn publish_without_viewers_succeeds() {
        let bus = Arc::new(LocalBus::default());
        let publisher = Publisher::new(bus);
        publisher
            .publish_contest_update(ContestId::new(), "ACTIVE", "owner")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn bus_failure_surfaces_as_publish_error() {
        let publisher = Publisher::new(Arc::new(DownBus));
        let result = publisher
            .publish_contest_update(ContestId::new(), "ACTIVE", "owner")
            .await;
        assert_matches!(result, Err(PublishError::Bus(BusError::Unavailable(_))));
    }

    #[test]
    fn detail_kinds() {
        assert_eq!(EventDetail::ContestDeleted.kind(), EnvelopeKind::ContestUpdate);
        assert_eq!(
            EventDetail::QuarterResult {
                quarter: 1,
                square_id: None,
                value: None
            }
            .kind(),
            EnvelopeKind::QuarterResultUpdate
        );
    }
}
