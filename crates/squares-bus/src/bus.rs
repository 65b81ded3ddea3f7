//! Bus abstraction.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use futures::stream::BoxStream;
use squares_core::ContestId;
use squares_core::constants::CONTEST_TOPIC_PREFIX;

use crate::errors::BusError;

/// Topic name for a contest (`contest:<id>`).
pub fn contest_topic(contest_id: &ContestId) -> String {
    format!("{CONTEST_TOPIC_PREFIX}{contest_id}")
}

/// A publish/subscribe transport.
///
/// Delivery is at-most-once. Publishing to a topic nobody subscribes to
/// succeeds and drops the message. Each subscription gets its own cursor.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Send `payload` to every current subscriber of `topic`.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BusError>;

    /// Start receiving messages published to `topic` from now on.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError>;

    /// Refuse further operations and end every open subscription stream.
    fn close(&self);
}

/// A live subscription to one topic.
///
/// Dropping it releases the subscription. The stream ends when the bus
/// closes the topic.
pub struct Subscription {
    topic: String,
    inner: BoxStream<'static, Bytes>,
}

impl Subscription {
    /// Wrap a byte stream as a subscription to `topic`.
    pub fn new(topic: impl Into<String>, inner: BoxStream<'static, Bytes>) -> Self {
        Self {
            topic: topic.into(),
            inner,
        }
    }

    /// The subscribed topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

impl Stream for Subscription {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.inner.as_mut().poll_next(cx)
    }
}
