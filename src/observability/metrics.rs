//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define request and instrumentation metrics
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `request_telemetry_requests_total` (counter): requests by resource, status
//! - `request_telemetry_request_duration_seconds` (histogram): handler time
//! - `request_telemetry_sink_write_failures_total` (counter): by sink
//! - `request_telemetry_config_reloads_total` (counter): by section, outcome
//!
//! # Design Decisions
//! - Calls are no-ops until `init_metrics` installs a recorder
//! - Nothing here logs; it is called from inside the sink write path

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(resource: &str, status: &str, handler_time: Duration) {
    counter!(
        "request_telemetry_requests_total",
        "resource" => resource.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(
        "request_telemetry_request_duration_seconds",
        "resource" => resource.to_string()
    )
    .record(handler_time.as_secs_f64());
}

pub fn record_sink_failure(sink: &'static str) {
    counter!("request_telemetry_sink_write_failures_total", "sink" => sink).increment(1);
}

pub fn record_config_reload(section: &'static str, outcome: &'static str) {
    counter!(
        "request_telemetry_config_reloads_total",
        "section" => section,
        "outcome" => outcome
    )
    .increment(1);
}
