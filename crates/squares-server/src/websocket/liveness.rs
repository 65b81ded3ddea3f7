//! Pong-driven read deadline.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Last-pong bookkeeping for one session.
///
/// Written by the inbound task on every pong, read by the same task when its
/// read deadline fires. A session is dead once `pong_wait` passes with no
/// pong; the deadline starts counting at creation.
pub struct Liveness {
    last_pong: Mutex<Instant>,
    pong_wait: Duration,
}

impl Liveness {
    /// Fresh liveness state; the first deadline is `pong_wait` from now.
    pub fn new(pong_wait: Duration) -> Self {
        Self {
            last_pong: Mutex::new(Instant::now()),
            pong_wait,
        }
    }

    /// A pong arrived: push the deadline out.
    pub fn record_pong(&self) {
        *self.last_pong.lock() = Instant::now();
    }

    /// When the last pong (or creation) happened.
    pub fn last_pong(&self) -> Instant {
        *self.last_pong.lock()
    }

    /// The instant after which the peer counts as gone.
    pub fn read_deadline(&self) -> Instant {
        self.last_pong() + self.pong_wait
    }

    /// Whether the read deadline has passed at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.read_deadline()
    }
}
