//! In-process bus.
//!
//! One `tokio::sync::broadcast` channel per topic, created on first
//! subscribe and pruned once a publish finds no receivers left. A slow
//! subscriber that falls more than `capacity` messages behind skips the
//! overflow (logged) and keeps receiving.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

use crate::bus::{Bus, Subscription};
use crate::errors::BusError;

/// Default per-topic buffer.
pub const DEFAULT_CAPACITY: usize = 256;

/// Topic bus confined to one process.
pub struct LocalBus {
    topics: DashMap<String, broadcast::Sender<Bytes>>,
    capacity: usize,
    closed: AtomicBool,
}

impl LocalBus {
    /// Create a bus whose topics buffer `capacity` messages per subscriber.
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .get(topic)
            .map_or(0, |tx| tx.receiver_count())
    }

    /// Number of topics currently holding a channel.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl Bus for LocalBus {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let delivered = self
            .topics
            .get(topic)
            .map_or(0, |tx| tx.send(payload).unwrap_or(0));

        if delivered == 0 {
            let _ = self
                .topics
                .remove_if(topic, |_, tx| tx.receiver_count() == 0);
        }
        debug!(topic, delivered, "bus publish");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        if self.is_closed() {
            return Err(BusError::Closed);
        }

        let rx = self
            .topics
            .entry(topic.to_owned())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        let name = topic.to_owned();
        let stream = BroadcastStream::new(rx).filter_map(move |item| {
            let item = match item {
                Ok(bytes) => Some(bytes),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(topic = %name, skipped, "subscriber lagged, messages dropped");
                    None
                }
            };
            futures::future::ready(item)
        });

        Ok(Subscription::new(topic, stream.boxed()))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.topics.clear();
    }
}
