//! Metrics collection and exposition.
//!
//! # Metrics
//! - `integrityx_http_requests_total` (counter): requests by method, status
//! - `integrityx_http_request_duration_seconds` (histogram): latency distribution
//! - `integrityx_artifacts_ingested_total` (counter): ingests by document kind
//! - `integrityx_seal_attempts_total` (counter): sealing calls by outcome
//! - `integrityx_verifications_total` (counter): verifications by outcome
//! - `integrityx_rate_limited_total` (counter): rejected by the rate limiter

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "integrityx_http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("integrityx_http_request_duration_seconds")
        .record(start.elapsed().as_secs_f64());
}

pub fn record_ingest(kind: &str) {
    metrics::counter!("integrityx_artifacts_ingested_total", "kind" => kind.to_string())
        .increment(1);
}

pub fn record_seal(outcome: &'static str) {
    metrics::counter!("integrityx_seal_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_verification(valid: bool) {
    let outcome = if valid { "valid" } else { "invalid" };
    metrics::counter!("integrityx_verifications_total", "outcome" => outcome).increment(1);
}

pub fn record_rate_limited() {
    metrics::counter!("integrityx_rate_limited_total").increment(1);
}
