//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by provider, outcome
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_provider_attempts_total` (counter): upstream calls, including retries
//! - `gateway_retries_total` (counter): retries by provider and error kind
//! - `gateway_errors_classified_total` (counter): classifications by kind
//! - `gateway_cache_lookups_total` (counter): hit / miss / error
//! - `gateway_cache_entries` (gauge): entries held by the in-memory store

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(
            address = %addr,
            error = %e,
            "Failed to install metrics exporter"
        ),
    }
}

/// Record a finished gateway request.
pub fn record_request(provider: &str, outcome: &str, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "provider" => provider.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "gateway_request_duration_seconds",
        "provider" => provider.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record one upstream provider attempt.
pub fn record_provider_attempt(provider: &str) {
    metrics::counter!("gateway_provider_attempts_total", "provider" => provider.to_string())
        .increment(1);
}

/// Record a scheduled retry.
pub fn record_retry(provider: &str, kind: &str) {
    metrics::counter!(
        "gateway_retries_total",
        "provider" => provider.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record a classification result.
pub fn record_classification(kind: &str) {
    metrics::counter!("gateway_errors_classified_total", "kind" => kind.to_string()).increment(1);
}

/// Record a cache lookup result ("hit", "miss", "error").
pub fn record_cache_lookup(result: &'static str) {
    metrics::counter!("gateway_cache_lookups_total", "result" => result).increment(1);
}

/// Record the current number of cache entries.
pub fn record_cache_size(size: usize) {
    metrics::gauge!("gateway_cache_entries").set(size as f64);
}
