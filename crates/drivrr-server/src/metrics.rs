//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render `/metrics`. Fails if a global recorder
/// is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter, labels: role).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter, labels: role).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrades refused at the connection limit (counter).
pub const WS_CONNECTIONS_REJECTED_TOTAL: &str = "ws_connections_rejected_total";
/// WebSocket session duration seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Outbound messages dropped on a full queue (counter).
pub const WS_OUTBOUND_DROPS_TOTAL: &str = "ws_outbound_drops_total";
/// Inbound messages rejected by the decoder or role check (counter, labels: kind).
pub const WS_PROTOCOL_FAULTS_TOTAL: &str = "ws_protocol_faults_total";
/// Inbound messages dispatched to a handler (counter, labels: type).
pub const DISPATCH_MESSAGES_TOTAL: &str = "dispatch_messages_total";
/// Rides assigned to a driver (counter).
pub const RIDES_ASSIGNED_TOTAL: &str = "rides_assigned_total";
/// Rides completed (counter).
pub const RIDES_COMPLETED_TOTAL: &str = "rides_completed_total";
/// Rides cancelled by either party (counter).
pub const RIDES_CANCELLED_TOTAL: &str = "rides_cancelled_total";
/// Offers rejected because the driver or ride was already taken (counter, labels: reason).
pub const OFFERS_REJECTED_TOTAL: &str = "offers_rejected_total";
