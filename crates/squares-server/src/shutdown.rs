//! Graceful shutdown coordination via `CancellationToken`.
//!
//! Every realtime session runs on a child of the coordinator's token, so a
//! single `shutdown()` closes them all with a "going away" frame.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::websocket::SessionRegistry;

/// Default time allowed for sessions and tasks to wind down.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Coordinates graceful shutdown across the listener and all sessions.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Get a clone of the root cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel everything, then wait up to `timeout` for every session to
    /// deregister and every handle to finish.
    ///
    /// Returns `false` if the timeout elapsed first.
    pub async fn graceful_shutdown(
        &self,
        registry: &SessionRegistry,
        handles: Vec<JoinHandle<()>>,
        timeout: Option<Duration>,
    ) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        info!(
            sessions = registry.count(),
            task_count = handles.len(),
            timeout_secs = timeout.as_secs(),
            "draining realtime sessions"
        );

        let drain = async {
            registry.wait_until_empty().await;
            let _ = futures::future::join_all(handles).await;
        };

        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(
                remaining = registry.count(),
                "shutdown timed out after {timeout:?}"
            );
            return false;
        }
        info!("shutdown complete");
        true
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
