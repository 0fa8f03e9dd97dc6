//! Application state for Axum handlers.

use metrics_exporter_prometheus::PrometheusHandle;
use order_cache_runtime::LookupService;

/// State shared across all HTTP handlers.
///
/// Handlers only ever read the cache through [`LookupService`]; the durable
/// store is not reachable from here.
#[derive(Clone)]
pub struct AppState {
    /// Cache lookups
    pub lookup: LookupService,
    /// Prometheus render handle, if a recorder was installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create state without a metrics handle.
    #[must_use]
    pub const fn new(lookup: LookupService) -> Self {
        Self {
            lookup,
            metrics: None,
        }
    }

    /// Serve `handle` at `GET /metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
