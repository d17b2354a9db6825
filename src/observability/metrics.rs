//! Metrics collection and exposition.
//!
//! # Metrics
//! - `navdata_rate_limited_total` (counter): 429 responses by service
//! - `navdata_retry_exhausted_total` (counter): requests that ran out of retries
//! - `navdata_provider_attempts_total` (counter): provider calls by provider, domain, outcome
//! - `navdata_failover_total` (counter): walks won by a non-primary provider
//! - `navdata_circuit_open` (gauge): 1=open, 0=closed, per provider
//! - `navdata_cache_events_total` (counter): hit/miss/stale/dedup
//! - `navdata_prefetch_tiles_total` (counter): tiles by result
//! - `navdata_prefetch_bytes_total` (counter): bytes written by prefetch
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; the exporter is optional
//! - Labels are low-cardinality (names, domains, fixed outcome strings)

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_rate_limited(service: &str) {
    counter!("navdata_rate_limited_total", "service" => service.to_string()).increment(1);
}

pub fn record_retry_exhausted(service: &str) {
    counter!("navdata_retry_exhausted_total", "service" => service.to_string()).increment(1);
}

pub fn record_provider_attempt(provider: &str, domain: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(
        "navdata_provider_attempts_total",
        "provider" => provider.to_string(),
        "domain" => domain.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_failover(domain: &str, provider: &str) {
    counter!(
        "navdata_failover_total",
        "domain" => domain.to_string(),
        "provider" => provider.to_string()
    )
    .increment(1);
}

pub fn record_circuit_state(provider: &str, open: bool) {
    gauge!("navdata_circuit_open", "provider" => provider.to_string()).set(if open { 1.0 } else { 0.0 });
}

/// `event` is one of `hit`, `miss`, `stale`, `dedup`.
pub fn record_cache_event(event: &'static str) {
    counter!("navdata_cache_events_total", "event" => event).increment(1);
}

pub fn record_prefetch_tile(success: bool) {
    let result = if success { "cached" } else { "failed" };
    counter!("navdata_prefetch_tiles_total", "result" => result).increment(1);
}

pub fn record_prefetch_bytes(bytes: u64) {
    counter!("navdata_prefetch_bytes_total").increment(bytes);
}
