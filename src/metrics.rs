//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blogfed_http_requests_total", "Total number of HTTP requests"),
        &["method", "status"]
    ).expect("metric can be created");
    pub static ref HTTP_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "blogfed_http_request_duration_seconds",
            "HTTP request duration in seconds"
        ).buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method"]
    ).expect("metric can be created");

    // Federation Metrics
    pub static ref FEDERATION_INBOUND_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blogfed_federation_inbound_total", "Inbound federation actions by outcome"),
        &["action", "outcome"]
    ).expect("metric can be created");
    pub static ref FEDERATION_OUTBOUND_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blogfed_federation_outbound_total", "Outbound federation actions by outcome"),
        &["action", "outcome"]
    ).expect("metric can be created");
    pub static ref FEDERATION_OUTBOUND_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "blogfed_federation_outbound_duration_seconds",
            "Outbound federation request duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["action"]
    ).expect("metric can be created");
    pub static ref SIGNATURE_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blogfed_signature_failures_total", "Rejected inbound signatures by reason"),
        &["reason"]
    ).expect("metric can be created");
    pub static ref DISCOVERY_FETCHES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blogfed_discovery_fetches_total", "Well-known document fetches by kind and status"),
        &["kind", "status"]
    ).expect("metric can be created");

    // Cache Metrics
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blogfed_cache_hits_total", "Total number of metadata cache hits"),
        &["kind"]
    ).expect("metric can be created");
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blogfed_cache_misses_total", "Total number of metadata cache misses"),
        &["kind"]
    ).expect("metric can be created");
    pub static ref CACHE_SIZE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("blogfed_cache_size", "Current number of items in cache"),
        &["cache_name"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("blogfed_errors_total", "Total number of error responses"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
///
/// Safe to call more than once; collectors that are already registered
/// are skipped.
pub fn init_metrics() {
    let collectors: Vec<(&str, Box<dyn prometheus::core::Collector>)> = vec![
        ("HTTP_REQUESTS_TOTAL", Box::new(HTTP_REQUESTS_TOTAL.clone())),
        (
            "HTTP_REQUEST_DURATION_SECONDS",
            Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()),
        ),
        (
            "FEDERATION_INBOUND_TOTAL",
            Box::new(FEDERATION_INBOUND_TOTAL.clone()),
        ),
        (
            "FEDERATION_OUTBOUND_TOTAL",
            Box::new(FEDERATION_OUTBOUND_TOTAL.clone()),
        ),
        (
            "FEDERATION_OUTBOUND_DURATION_SECONDS",
            Box::new(FEDERATION_OUTBOUND_DURATION_SECONDS.clone()),
        ),
        (
            "SIGNATURE_FAILURES_TOTAL",
            Box::new(SIGNATURE_FAILURES_TOTAL.clone()),
        ),
        (
            "DISCOVERY_FETCHES_TOTAL",
            Box::new(DISCOVERY_FETCHES_TOTAL.clone()),
        ),
        ("CACHE_HITS_TOTAL", Box::new(CACHE_HITS_TOTAL.clone())),
        ("CACHE_MISSES_TOTAL", Box::new(CACHE_MISSES_TOTAL.clone())),
        ("CACHE_SIZE", Box::new(CACHE_SIZE.clone())),
        ("ERRORS_TOTAL", Box::new(ERRORS_TOTAL.clone())),
    ];

    for (name, collector) in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(error) => tracing::error!(metric = name, %error, "Failed to register metric"),
        }
    }

    tracing::info!("Metrics registry initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_metrics_is_idempotent() {
        init_metrics();
        init_metrics();

        FEDERATION_INBOUND_TOTAL
            .with_label_values(&["citation", "accepted"])
            .inc();
        let families = REGISTRY.gather();
        assert!(
            families
                .iter()
                .any(|family| family.get_name() == "blogfed_federation_inbound_total")
        );
    }
}
