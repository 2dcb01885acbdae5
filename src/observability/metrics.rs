//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, route, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): denied admissions
//! - `gateway_errors_total` (counter): failure envelopes by kind, status
//! - `gateway_upstream_failures_total` (counter): transport failures and timeouts
//! - `gateway_rate_limit_buckets` (gauge): live client buckets after a sweep

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("route", route.to_string()),
    ];
    counter!("gateway_requests_total", &labels).increment(1);
    histogram!("gateway_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    counter!("gateway_rate_limited_total").increment(1);
}

pub fn record_error(kind: &'static str, status: u16) {
    counter!(
        "gateway_errors_total",
        "kind" => kind,
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_upstream_failure(reason: &'static str) {
    counter!("gateway_upstream_failures_total", "reason" => reason).increment(1);
}

pub fn record_bucket_count(count: usize) {
    gauge!("gateway_rate_limit_buckets").set(count as f64);
}
