//! Prometheus metrics for org-service.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter, CounterVec, HistogramVec,
    IntCounter, TextEncoder,
};
use std::sync::OnceLock;

/// Recorder handle backing the `metrics`-facade counters recorded by the
/// shared HTTP middleware. Installed once per process; later application
/// builds in the same process (tests) reuse the first handle.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "org_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Units created counter.
pub static UNITS_CREATED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "org_units_created_total",
        "Total number of organization units created"
    )
    .expect("Failed to register units_created")
});

/// Units deleted counter.
pub static UNITS_DELETED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "org_units_deleted_total",
        "Total number of organization units deleted"
    )
    .expect("Failed to register units_deleted")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "org_errors_total",
        "Total number of errors by type",
        &["error_type"] // db_error, cycle_rejected, conflict, etc.
    )
    .expect("Failed to register errors_total")
});

/// Initialize all metrics (forces lazy initialization and installs the
/// facade recorder).
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_none() {
        if let Ok(handle) = PrometheusBuilder::new().install_recorder() {
            METRICS_HANDLE.set(handle).ok();
        }
    }

    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&UNITS_CREATED);
    Lazy::force(&UNITS_DELETED);
    Lazy::force(&ERRORS_TOTAL);
}

/// Get metrics in Prometheus text format: the facade recorder's HTTP metrics
/// followed by the registry-backed service metrics.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    if let Ok(service_metrics) = encoder.encode_to_string(&metric_families) {
        output.push_str(&service_metrics);
    }

    output
}
