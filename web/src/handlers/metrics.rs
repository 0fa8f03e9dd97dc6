//! Prometheus scrape endpoint.

use crate::error::AppError;
use crate::state::AppState;
use axum::extract::State;

/// Render all recorded metrics in Prometheus text format.
///
/// # Endpoint
///
/// ```text
/// GET /metrics
/// ```
///
/// # Errors
///
/// Returns 503 if no recorder was installed.
#[allow(clippy::unused_async)]
pub async fn metrics(State(state): State<AppState>) -> Result<String, AppError> {
    state
        .metrics
        .as_ref()
        .map(metrics_exporter_prometheus::PrometheusHandle::render)
        .ok_or_else(|| AppError::unavailable("metrics recorder not installed"))
}
