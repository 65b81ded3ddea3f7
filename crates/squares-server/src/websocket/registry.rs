//! Live session bookkeeping.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use squares_core::{ConnectionId, ContestId};
use tokio::sync::Notify;

/// Which sessions are live and which contest each one watches.
///
/// Sessions register themselves on start and deregister on exit; the
/// registry never owns or signals them.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<ConnectionId, ContestId>>,
    emptied: Notify,
}

impl SessionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a live session.
    pub fn add(&self, connection_id: ConnectionId, contest_id: ContestId) {
        let _ = self.sessions.write().insert(connection_id, contest_id);
    }

    /// Forget a session. Returns `false` if it was not registered.
    pub fn remove(&self, connection_id: &ConnectionId) -> bool {
        let (removed, now_empty) = {
            let mut sessions = self.sessions.write();
            let removed = sessions.remove(connection_id).is_some();
            (removed, sessions.is_empty())
        };
        if removed && now_empty {
            self.emptied.notify_waiters();
        }
        removed
    }

    /// Resolve once no session is registered.
    pub async fn wait_until_empty(&self) {
        loop {
            // Registered before the check so a concurrent last removal is seen.
            let emptied = self.emptied.notified();
            if self.count() == 0 {
                return;
            }
            emptied.await;
        }
    }

    /// Live sessions.
    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Live sessions watching `contest_id`.
    pub fn count_for_contest(&self, contest_id: &ContestId) -> usize {
        self.sessions
            .read()
            .values()
            .filter(|c| *c == contest_id)
            .count()
    }

    /// Distinct contests with at least one viewer.
    pub fn contest_count(&self) -> usize {
        self.sessions.read().values().collect::<HashSet<_>>().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn add_and_count() {
        let reg = SessionRegistry::new();
        let a = ContestId::new();
        let b = ContestId::new();
        reg.add(ConnectionId::new(), a);
        reg.add(ConnectionId::new(), a);
        reg.add(ConnectionId::new(), b);
        assert_eq!(reg.count(), 3);
        assert_eq!(reg.count_for_contest(&a), 2);
        assert_eq!(reg.count_for_contest(&b), 1);
        assert_eq!(reg.contest_count(), 2);
    }

    #[test]
    fn remove_is_idempotent() {
        let reg = SessionRegistry::new();
        let conn = ConnectionId::new();
        reg.add(conn, ContestId::new());
        assert!(reg.remove(&conn));
        assert!(!reg.remove(&conn));
        assert_eq!(reg.count(), 0);
        assert_eq!(reg.contest_count(), 0);
    }

    #[tokio::test]
    async fn wait_until_empty_wakes_on_last_removal() {
        let reg = Arc::new(SessionRegistry::new());
        let (a, b) = (ConnectionId::new(), ConnectionId::new());
        reg.add(a, ContestId::new());
        reg.add(b, ContestId::new());

        let waiter = tokio::spawn({
            let reg = reg.clone();
            async move { reg.wait_until_empty().await }
        });
        tokio::task::yield_now().await;

        assert!(reg.remove(&a));
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        assert!(reg.remove(&b));
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn wait_until_empty_returns_at_once_when_idle() {
        let reg = SessionRegistry::new();
        tokio::time::timeout(Duration::from_millis(100), reg.wait_until_empty())
            .await
            .unwrap();
    }
}
