//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the bundlebot server:
//! - HTTP request metrics (latency, counts, errors)
//! - Inbound events by dispatch outcome
//! - Registry and finalize gauges (collected dynamically)
//!
//! Core metrics (finalize, retrieval, archive) are registered here too.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use regex_lite::Regex;
use tracing::warn;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "bundlebot_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bundlebot_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "bundlebot_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Authentication failures.
pub static AUTH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "bundlebot_auth_failures_total",
            "Total authentication failures",
        ),
        &["reason"],
    )
    .unwrap()
});

// =============================================================================
// Inbound Event Metrics
// =============================================================================

/// Inbound events by dispatch outcome.
pub static EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bundlebot_events_total", "Inbound chat events by outcome"),
        &["outcome"],
    )
    .unwrap()
});

// =============================================================================
// Batch Metrics (collected dynamically)
// =============================================================================

/// Open batches.
pub static OPEN_BATCHES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("bundlebot_open_batches", "Number of open batches").unwrap()
});

/// Batches being finalized.
pub static FINALIZING_BATCHES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "bundlebot_finalizing_batches",
        "Number of batches currently being finalized",
    )
    .unwrap()
});

/// Items waiting in open batches.
pub static OPEN_ITEMS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("bundlebot_open_items", "Items recorded into open batches").unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();
    registry
        .register(Box::new(AUTH_FAILURES_TOTAL.clone()))
        .unwrap();

    // Events
    registry.register(Box::new(EVENTS_TOTAL.clone())).unwrap();

    // Batches
    registry.register(Box::new(OPEN_BATCHES.clone())).unwrap();
    registry
        .register(Box::new(FINALIZING_BATCHES.clone()))
        .unwrap();
    registry.register(Box::new(OPEN_ITEMS.clone())).unwrap();

    // Core metrics (registry, finalize, retrieval, archive)
    for metric in bundlebot_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Refresh gauges from current application state before encoding.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let stats = state.orchestrator().status().registry;
    OPEN_BATCHES.set(stats.open_batches as i64);
    FINALIZING_BATCHES.set(stats.finalizing_batches as i64);
    OPEN_ITEMS.set(stats.open_items as i64);
}

static NUMERIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/-?\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace user ids with placeholders).
pub fn normalize_path(path: &str) -> String {
    // Applied twice: adjacent numeric segments share a slash.
    let once = NUMERIC_SEGMENT.replace_all(path, "/{id}$1");
    NUMERIC_SEGMENT.replace_all(&once, "/{id}$1").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_user_id() {
        assert_eq!(
            normalize_path("/api/v1/batches/123456789"),
            "/api/v1/batches/{id}"
        );
        assert_eq!(normalize_path("/api/v1/batches/-42"), "/api/v1/batches/{id}");
    }

    #[test]
    fn test_normalize_path_adjacent_ids() {
        assert_eq!(normalize_path("/a/1/2/b"), "/a/{id}/{id}/b");
    }

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/api/v1/health"), "/api/v1/health");
        assert_eq!(normalize_path("/api/v1/v2x"), "/api/v1/v2x");
    }

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();
        OPEN_BATCHES.set(0);

        let output = encode_metrics();
        assert!(output.contains("bundlebot_http_requests_total"));
        assert!(output.contains("bundlebot_open_batches"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_includes_core_metrics() {
        bundlebot_core::metrics::BATCHES_STARTED.inc();
        let output = encode_metrics();
        assert!(output.contains("bundlebot_batches_started_total"));
    }
}
