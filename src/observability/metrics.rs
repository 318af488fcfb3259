//! Metrics collection and exposition.
//!
//! # Metrics
//! - `jaws_requests_total` (counter): requests by method and status
//! - `jaws_request_duration_seconds` (histogram): dispatch latency
//! - `jaws_active_connections` (gauge): live connection count
//! - `jaws_rate_limited_total` (counter): requests rejected by the limiter
//! - `jaws_template_errors_total` (counter): template expansions that failed, by kind
//!
//! Recording is a no-op until [`init_metrics`] installs the Prometheus recorder.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("jaws_requests_total", &labels).increment(1);
    metrics::histogram!("jaws_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_active_connections(count: u64) {
    metrics::gauge!("jaws_active_connections").set(count as f64);
}

pub fn record_rate_limited() {
    metrics::counter!("jaws_rate_limited_total").increment(1);
}

pub fn record_template_error(kind: &'static str) {
    metrics::counter!("jaws_template_errors_total", "kind" => kind).increment(1);
}
