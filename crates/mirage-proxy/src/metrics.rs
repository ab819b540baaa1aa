//! Prometheus metrics for mirage-proxy.
//!
//! Tracks requests per mode, cache effectiveness, state transitions and the
//! delays applied to simulated responses.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    /// Requests processed, by mode and outcome (ok|matching_failed|forwarding_failed|...)
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "mirage_requests_total",
        "Total number of requests processed by the engine",
        &["mode", "outcome"]
    )
    .unwrap();

    /// Match cache lookups
    pub static ref CACHE_LOOKUPS_TOTAL: CounterVec = register_counter_vec!(
        "mirage_cache_lookups_total",
        "Total number of match cache lookups",
        &["result"]  // result: hit|miss
    )
    .unwrap();

    /// Process state mutations
    pub static ref STATE_TRANSITIONS_TOTAL: CounterVec = register_counter_vec!(
        "mirage_state_transitions_total",
        "Total number of process state mutations",
        &["operation"]  // operation: patch|remove
    )
    .unwrap();

    /// Response delay in milliseconds
    pub static ref DELAY_APPLIED_MS: HistogramVec = register_histogram_vec!(
        "mirage_delay_applied_ms",
        "Histogram of response delays applied in milliseconds",
        &["kind"],  // kind: fixed|lognormal
        vec![10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# failed to encode metrics: {e}\n");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Helper to record a processed request
pub fn record_request(mode: &str, outcome: &str) {
    REQUESTS_TOTAL.with_label_values(&[mode, outcome]).inc();
}

/// Helper to record a cache lookup
pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    CACHE_LOOKUPS_TOTAL.with_label_values(&[result]).inc();
}

/// Helper to record a state mutation
pub fn record_state_transition(operation: &str) {
    STATE_TRANSITIONS_TOTAL
        .with_label_values(&[operation])
        .inc();
}

/// Helper to record an applied delay
pub fn record_delay(kind: &str, duration_ms: u64) {
    DELAY_APPLIED_MS
        .with_label_values(&[kind])
        .observe(duration_ms as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collection() {
        record_request("simulate", "ok");
        record_cache_lookup(true);
        record_cache_lookup(false);

        let metrics = collect_metrics();
        assert!(metrics.contains("mirage_requests_total"));
        assert!(metrics.contains("mirage_cache_lookups_total"));
    }

    #[test]
    fn test_state_and_delay_metrics() {
        record_state_transition("patch");
        record_state_transition("remove");
        record_delay("fixed", 120);

        let metrics = collect_metrics();
        assert!(metrics.contains("mirage_state_transitions_total"));
        assert!(metrics.contains("mirage_delay_applied_ms"));
    }
}
