//! Prometheus metrics recorder and `/metrics` rendering.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Call once at startup,
/// before any metric is recorded; a second install fails.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// A handle backed by a recorder that is not installed globally.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants shared by the session and handshake code.

/// Realtime sessions started (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// Realtime sessions ended (counter, labels: reason).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Live realtime sessions (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Session lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Upgrade requests refused (counter, labels: code).
pub const WS_HANDSHAKE_REJECTIONS_TOTAL: &str = "ws_handshake_rejections_total";
/// Envelopes written to clients from the bus (counter, labels: type).
pub const ENVELOPES_DELIVERED_TOTAL: &str = "envelopes_delivered_total";
/// Bus payloads that failed to decode (counter).
pub const ENVELOPE_DECODE_FAILURES_TOTAL: &str = "envelope_decode_failures_total";
