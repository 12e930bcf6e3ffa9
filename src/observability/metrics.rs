//! Metrics collection and exposition.
//!
//! # Metrics
//! - `requests_recorded_total` (counter): inbound requests logged
//! - `request_log_skipped_total` (counter): requests under the log viewer prefix
//! - `log_sink_written_total` (counter): records handed to the stores
//! - `log_sink_dropped_total` (counter): records dropped by a full buffer
//! - `log_store_errors_total` (counter): failed store writes, by store
//! - `jobs_enqueued_total` / `jobs_completed_total` (counters)
//! - `downstream_requests_total` (counter): outbound calls by client, status
//!
//! # Design Decisions
//! - `metrics` facade: recording is a no-op until an exporter is installed
//! - Prometheus exporter only when enabled in config

use std::net::SocketAddr;

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request_logged(method: &str) {
    counter!("requests_recorded_total", "method" => method.to_string()).increment(1);
}

pub fn record_request_skipped() {
    counter!("request_log_skipped_total").increment(1);
}

pub fn record_sink_written(count: usize) {
    counter!("log_sink_written_total").increment(count as u64);
}

pub fn record_sink_dropped() {
    counter!("log_sink_dropped_total").increment(1);
}

pub fn record_store_error(store: &str) {
    counter!("log_store_errors_total", "store" => store.to_string()).increment(1);
}

pub fn record_job_enqueued() {
    counter!("jobs_enqueued_total").increment(1);
}

pub fn record_job_completed(outcome: &'static str) {
    counter!("jobs_completed_total", "outcome" => outcome).increment(1);
}

pub fn record_downstream(client: &str, status: u16) {
    counter!(
        "downstream_requests_total",
        "client" => client.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}
