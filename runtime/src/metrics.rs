//! Prometheus metrics for the ingest pipeline, cache and lookups.
//!
//! Recording goes through the `metrics` facade and is a no-op until a
//! recorder is installed, so library code and tests never need one.
//!
//! # Example
//!
//! ```rust,no_run
//! use order_cache_runtime::metrics::install_recorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handle = install_recorder()?;
//! // Serve `handle.render()` at GET /metrics
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Install the global Prometheus recorder and return a handle for rendering.
///
/// # Errors
///
/// Returns [`MetricsError::Install`] if a recorder is already installed.
pub fn install_recorder() -> Result<PrometheusHandle, MetricsError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    register_metrics();
    tracing::info!("Metrics recorder installed");
    Ok(handle)
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "ingest_events_total",
        "Inbound events by terminal state (acknowledged, rejected, failed)"
    );
    describe_histogram!(
        "ingest_persist_duration_seconds",
        "Time taken to persist an order, including the existence check"
    );
    describe_counter!(
        "ingest_duplicates_total",
        "Events whose order was already stored (redeliveries)"
    );
    describe_counter!(
        "ingest_ack_failures_total",
        "Acknowledgements that could not be delivered to the source"
    );
    describe_counter!("dead_letters_total", "Rejected events recorded as dead letters");
    describe_gauge!("cache_entries", "Number of orders in the read cache");
    describe_counter!(
        "lookup_requests_total",
        "Lookups by result (hit, miss, bad_request)"
    );
}

/// Ingest pipeline metrics recorder.
pub struct IngestMetrics;

impl IngestMetrics {
    /// Record the terminal state of an event.
    pub fn record_outcome(outcome: &'static str) {
        counter!("ingest_events_total", "outcome" => outcome).increment(1);
    }

    /// Record a persist call.
    pub fn record_persist(duration: Duration) {
        histogram!("ingest_persist_duration_seconds").record(duration.as_secs_f64());
    }

    /// Record an event whose order was already stored.
    pub fn record_duplicate() {
        counter!("ingest_duplicates_total").increment(1);
    }

    /// Record an acknowledgement that did not reach the source.
    pub fn record_ack_failure() {
        counter!("ingest_ack_failures_total").increment(1);
    }

    /// Record a dead-lettered event.
    pub fn record_dead_letter() {
        counter!("dead_letters_total").increment(1);
    }
}

/// Read cache metrics recorder.
pub struct CacheMetrics;

impl CacheMetrics {
    /// Record the current number of entries.
    #[allow(clippy::cast_precision_loss)] // Entry counts stay far below 2^52
    pub fn record_size(len: usize) {
        gauge!("cache_entries").set(len as f64);
    }
}

/// Lookup metrics recorder.
pub struct LookupMetrics;

impl LookupMetrics {
    /// Record a lookup by result.
    pub fn record(result: &'static str) {
        counter!("lookup_requests_total", "result" => result).increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        IngestMetrics::record_outcome("acknowledged");
        IngestMetrics::record_persist(Duration::from_millis(3));
        CacheMetrics::record_size(10);
        LookupMetrics::record("hit");
    }

    #[test]
    fn installed_recorder_renders_ingest_metrics() {
        // Only one recorder can be installed per process; another test
        // binary may have done it already.
        let Ok(handle) = install_recorder() else {
            return;
        };

        IngestMetrics::record_outcome("acknowledged");
        IngestMetrics::record_duplicate();

        let rendered = handle.render();
        assert!(rendered.contains("ingest_events_total"));
        assert!(rendered.contains("ingest_duplicates_total"));
    }
}
