//! # squares-bus
//!
//! Cross-session fan-out for contest updates.
//!
//! - [`Bus`]: what every pub/sub transport provides: publish bytes to a
//!   topic, subscribe to a topic's byte stream, close
//! - [`LocalBus`]: in-process implementation backed by one
//!   `tokio::sync::broadcast` channel per topic, for single-node runs
//! - [`RedisBus`]: Redis pub/sub, shared by every backend process so a
//!   mutation committed anywhere reaches viewers connected anywhere
//! - [`Publisher`]: serializes one [`Envelope`](squares_core::Envelope) per
//!   mutation and fires it at the contest's topic
//!
//! Topics are addressed purely by contest id via [`contest_topic`].

#![deny(unsafe_code)]

pub mod bus;
pub mod errors;
pub mod local;
pub mod publisher;
pub mod remote;

pub use bus::{Bus, Subscription, contest_topic};
pub use errors::{BusError, PublishError};
pub use local::LocalBus;
pub use publisher::{EventDetail, Publisher};
pub use remote::RedisBus;
