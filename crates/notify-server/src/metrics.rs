//! Prometheus recorder and metric names.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::errors::ServerError;

/// Install the global Prometheus recorder.
///
/// Returns the handle that renders `/metrics`. Call once at startup, before
/// anything is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// `WebSocket` connections opened (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// `WebSocket` connections torn down (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Live `WebSocket` connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connection lifetime in seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// Events accepted for fan-out (counter, labels: kind).
pub const EVENTS_INGESTED_TOTAL: &str = "events_ingested_total";
/// Events of unknown kind, accepted and dropped (counter).
pub const EVENTS_DISCARDED_TOTAL: &str = "events_discarded_total";
/// Payloads queued to a subscriber (counter).
pub const EVENT_DELIVERIES_TOTAL: &str = "event_deliveries_total";
/// Payloads that had to wait for queue room (counter).
pub const EVENT_DEFERRED_DELIVERIES_TOTAL: &str = "event_deferred_deliveries_total";
/// Payloads never queued because the subscriber closed (counter).
pub const EVENT_DROPPED_DELIVERIES_TOTAL: &str = "event_dropped_deliveries_total";
