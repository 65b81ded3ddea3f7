//! `SquaresServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use squares_bus::{Bus, Publisher};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::auth::TokenVerifier;
use crate::config::ServerConfig;
use crate::gate::ContestGate;
use crate::health::{self, HealthResponse};
use crate::metrics;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::upgrade::contest_ws_handler;
use crate::websocket::{ClaimsExpiry, SessionDeps, SessionRegistry, SnapshotExpiry};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Contest update bus.
    pub bus: Arc<dyn Bus>,
    /// Handshake token verifier.
    pub verifier: Arc<dyn TokenVerifier>,
    /// Handshake contest gate.
    pub gate: Arc<dyn ContestGate>,
    /// Session revalidation predicate.
    pub expiry: Arc<dyn ClaimsExpiry>,
    /// Live sessions.
    pub registry: Arc<SessionRegistry>,
    /// One permit per admitted session, `max_connections` in total.
    pub slots: Arc<Semaphore>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Prometheus render handle.
    pub metrics: PrometheusHandle,
    /// When the server started.
    pub start_time: Instant,
}

impl AppState {
    /// Dependencies for a new session.
    pub fn session_deps(&self) -> SessionDeps {
        SessionDeps {
            bus: Arc::clone(&self.bus),
            expiry: Arc::clone(&self.expiry),
            registry: Arc::clone(&self.registry),
            shutdown: self.shutdown.token(),
            config: self.config.session.clone(),
        }
    }
}

/// The squares realtime server.
pub struct SquaresServer {
    state: AppState,
}

impl SquaresServer {
    /// Create a new server.
    pub fn new(
        config: ServerConfig,
        bus: Arc<dyn Bus>,
        verifier: Arc<dyn TokenVerifier>,
        gate: Arc<dyn ContestGate>,
        metrics: PrometheusHandle,
    ) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_connections));
        Self {
            state: AppState {
                config: Arc::new(config),
                bus,
                verifier,
                gate,
                expiry: Arc::new(SnapshotExpiry),
                registry: Arc::new(SessionRegistry::new()),
                slots,
                shutdown: Arc::new(ShutdownCoordinator::new()),
                metrics,
                start_time: Instant::now(),
            },
        }
    }

    /// Replace the revalidation predicate.
    #[must_use]
    pub fn with_expiry(mut self, expiry: Arc<dyn ClaimsExpiry>) -> Self {
        self.state.expiry = expiry;
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws/contests/{contest_id}", get(contest_ws_handler))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve in a background task until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let config = &self.state.config;
        let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.state.shutdown.token();

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "server terminated with error");
            }
        });

        info!(%addr, "squares server listening");
        Ok((addr, handle))
    }

    /// Publisher over this server's bus, for mutation handlers.
    pub fn publisher(&self) -> Publisher {
        Publisher::new(Arc::clone(&self.state.bus))
    }

    /// Live sessions.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.state.registry
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.count(),
        state.registry.contest_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    metrics::render(&state.metrics)
}
