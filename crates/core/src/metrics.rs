//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Task registry (batches started, items recorded or dropped)
//! - Finalize (outcomes, duration, archive sizes)
//! - Retrieval pool (fetches, bytes, in-flight gauge)

use once_cell::sync::Lazy;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
};

// =============================================================================
// Registry Metrics
// =============================================================================

/// Batches started via the start command.
pub static BATCHES_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("bundlebot_batches_started_total", "Total batches started").unwrap()
});

/// Item submissions by result.
pub static ITEMS_RECORDED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bundlebot_items_total", "Item submissions by result"),
        &["result"], // "recorded", "duplicate", "no_open_batch"
    )
    .unwrap()
});

/// Batches cancelled by the user.
pub static BATCHES_CANCELLED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bundlebot_batches_cancelled_total", "Cancel requests by outcome"),
        &["outcome"], // "removed", "signalled_finalize", "nothing"
    )
    .unwrap()
});

// =============================================================================
// Finalize Metrics
// =============================================================================

/// Finalize attempts by result.
pub static FINALIZE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bundlebot_finalize_total", "Finalize attempts by result"),
        &["result"], // "delivered", "empty_or_missing", "quota_exceeded", "pipeline_failure"
    )
    .unwrap()
});

/// Finalize duration in seconds.
pub static FINALIZE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "bundlebot_finalize_duration_seconds",
            "Duration of finalize operations",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 1800.0]),
        &["result"],
    )
    .unwrap()
});

/// Entries per delivered archive.
pub static ARCHIVE_ENTRIES: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "bundlebot_archive_entries",
            "Number of entries per delivered archive",
        )
        .buckets(vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]),
    )
    .unwrap()
});

// =============================================================================
// Retrieval Metrics
// =============================================================================

/// Payload fetches by result.
pub static FETCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bundlebot_fetches_total", "Payload fetches by result"),
        &["result"], // "success", "failed", "timeout", "cancelled"
    )
    .unwrap()
});

/// Payload bytes written to staging.
pub static BYTES_FETCHED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "bundlebot_bytes_fetched_total",
        "Total payload bytes retrieved from the origin",
    )
    .unwrap()
});

/// Fetches currently in flight across all batches.
pub static FETCHES_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "bundlebot_fetches_in_flight",
        "Number of payload fetches currently in flight",
    )
    .unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Registry
        Box::new(BATCHES_STARTED.clone()),
        Box::new(ITEMS_RECORDED.clone()),
        Box::new(BATCHES_CANCELLED.clone()),
        // Finalize
        Box::new(FINALIZE_TOTAL.clone()),
        Box::new(FINALIZE_DURATION.clone()),
        Box::new(ARCHIVE_ENTRIES.clone()),
        // Retrieval
        Box::new(FETCHES_TOTAL.clone()),
        Box::new(BYTES_FETCHED.clone()),
        Box::new(FETCHES_IN_FLIGHT.clone()),
    ]
}
