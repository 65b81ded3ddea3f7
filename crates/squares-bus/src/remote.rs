//! Redis pub/sub bus shared by every backend process.
//!
//! Publishes go through one multiplexed connection. Each subscription opens
//! its own pub/sub connection and `SUBSCRIBE`s to the contest topic; when
//! that connection drops the stream ends, which the session treats as a
//! closed bus.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bus::{Bus, Subscription};
use crate::errors::BusError;

/// Bus relayed through a Redis server.
#[derive(Debug)]
pub struct RedisBus {
    client: redis::Client,
    publisher: MultiplexedConnection,
    closed: CancellationToken,
}

impl RedisBus {
    /// Open a client for `url` and establish the publish connection.
    pub async fn connect(url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let publisher = client
            .get_multiplexed_async_connection()
            .await
            .map_err(unavailable)?;
        info!(addr = %client.get_connection_info().addr, "connected to redis bus");
        Ok(Self {
            client,
            publisher,
            closed: CancellationToken::new(),
        })
    }
}

fn unavailable(e: redis::RedisError) -> BusError {
    BusError::Unavailable(e.to_string())
}

#[async_trait]
impl Bus for RedisBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BusError> {
        if self.closed.is_cancelled() {
            return Err(BusError::Closed);
        }
        let mut conn = self.publisher.clone();
        let receivers: i64 = conn
            .publish(topic, &payload[..])
            .await
            .map_err(unavailable)?;
        debug!(topic, receivers, "bus publish");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        if self.closed.is_cancelled() {
            return Err(BusError::Closed);
        }
        let mut pubsub = self.client.get_async_pubsub().await.map_err(unavailable)?;
        pubsub.subscribe(topic).await.map_err(unavailable)?;

        let stream = pubsub
            .into_on_message()
            .map(|msg| Bytes::copy_from_slice(msg.get_payload_bytes()))
            .take_until(self.closed.clone().cancelled_owned());
        Ok(Subscription::new(topic, stream.boxed()))
    }

    fn close(&self) {
        self.closed.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Publisher, contest_topic};
    use assert_matches::assert_matches;
    use squares_core::{ContestId, EnvelopeKind};
    use std::time::Duration;

    fn test_url() -> String {
        std::env::var("SQUARES_TEST_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/".into())
    }

    #[tokio::test]
    async fn malformed_url_is_unavailable() {
        let result = RedisBus::connect("not a redis url").await;
        assert_matches!(result, Err(BusError::Unavailable(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let result = RedisBus::connect("redis://127.0.0.1:1/").await;
        assert_matches!(result, Err(BusError::Unavailable(_)));
    }

    // Needs a Redis server at SQUARES_TEST_REDIS_URL (default localhost:6379).
    #[tokio::test]
    #[ignore]
    async fn update_published_by_one_process_reaches_viewer_of_another() {
        let api = RedisBus::connect(&test_url()).await.unwrap();
        let realtime = RedisBus::connect(&test_url()).await.unwrap();
        let contest = ContestId::new();
        let mut viewer = realtime.subscribe(&contest_topic(&contest)).await.unwrap();

        Publisher::new(std::sync::Arc::new(api))
            .publish_contest_update(contest, "ACTIVE", "owner")
            .await
            .unwrap();

        let payload = tokio::time::timeout(Duration::from_secs(5), viewer.next())
            .await
            .unwrap()
            .unwrap();
        let envelope = squares_core::Envelope::from_slice(&payload).unwrap();
        assert_eq!(envelope.kind, EnvelopeKind::ContestUpdate);
        assert_eq!(envelope.contest_id, contest);
        assert_eq!(envelope.value.as_deref(), Some("ACTIVE"));
    }

    // Needs a Redis server at SQUARES_TEST_REDIS_URL (default localhost:6379).
    #[tokio::test]
    #[ignore]
    async fn close_ends_subscriptions_and_rejects_publish() {
        let bus = RedisBus::connect(&test_url()).await.unwrap();
        let mut sub = bus.subscribe(&contest_topic(&ContestId::new())).await.unwrap();

        bus.close();
        assert!(sub.next().await.is_none());
        assert_matches!(
            bus.publish("contest:x", Bytes::from_static(b"{}")).await,
            Err(BusError::Closed)
        );
        assert_matches!(bus.subscribe("contest:x").await, Err(BusError::Closed));
    }
}
