//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

/// Liveness check.
///
/// Returns 200 OK to indicate the process is running. Does not check
/// dependencies.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness check body.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Readiness {
    /// Whether lookups are being served
    pub ready: bool,
    /// Orders currently available for lookup
    pub cached_orders: usize,
}

/// Readiness check.
///
/// The HTTP server only starts after the read cache is warmed, so any
/// response from here means lookups are served.
///
/// # Endpoint
///
/// ```text
/// GET /ready
/// ```
///
/// # Response
///
/// ```json
/// { "ready": true, "cached_orders": 42 }
/// ```
pub async fn readiness(State(state): State<AppState>) -> Json<Readiness> {
    Json(Readiness {
        ready: true,
        cached_orders: state.lookup.cached_orders().await,
    })
}
