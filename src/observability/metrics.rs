//! Metrics collection and exposition.
//!
//! # Metrics
//! - `router_requests_total` (counter): requests by backend and status
//! - `router_request_duration_seconds` (histogram): latency by backend
//! - `router_active_connections` (gauge): in-flight requests per backend
//! - `router_telemetry_dropped_total` (counter): records dropped at enqueue
//! - `router_telemetry_flushed_total` (counter): records handed to the sink
//! - `router_telemetry_sink_errors_total` (counter): failed sink writes/flushes
//! - `router_shutdown_cancelled_total` (counter): requests cut off by shutdown
//!
//! All recorders are no-ops until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| e.to_string())?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

/// Record one completed dispatch.
pub fn record_request(backend: &str, status: u16, latency: Duration) {
    let backend = backend.to_string();
    counter!(
        "router_requests_total",
        "backend" => backend.clone(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("router_request_duration_seconds", "backend" => backend).record(latency.as_secs_f64());
}

pub fn set_active_connections(backend: &str, active: usize) {
    gauge!("router_active_connections", "backend" => backend.to_string()).set(active as f64);
}

pub fn record_telemetry_dropped() {
    counter!("router_telemetry_dropped_total").increment(1);
}

pub fn record_telemetry_flushed(records: u64) {
    counter!("router_telemetry_flushed_total").increment(records);
}

pub fn record_sink_error() {
    counter!("router_telemetry_sink_errors_total").increment(1);
}

pub fn record_shutdown_cancelled(requests: u64) {
    counter!("router_shutdown_cancelled_total").increment(requests);
}
