//! HTTP surface of the order cache.
//!
//! Every route reads from the in-memory cache through
//! [`LookupService`](order_cache_runtime::LookupService); nothing here
//! touches the durable store.
//!
//! # Routes
//!
//! ```text
//! GET /order?id=<order_uid>   200 order JSON | 400 | 404
//! GET /health                 200 "ok"
//! GET /ready                  200 {"ready": true, "cached_orders": n}
//! GET /metrics                Prometheus text (503 without a recorder)
//! GET /                       index page
//! GET /static/*               static assets
//! ```
//!
//! # Example
//!
//! ```ignore
//! use order_cache_web::{AppState, StaticAssets, router};
//!
//! let state = AppState::new(LookupService::new(cache)).with_metrics(handle);
//! let app = router(state, &StaticAssets::new("static", "inter.html"));
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod state;

pub use error::{AppError, ErrorResponse};
pub use state::AppState;

use axum::{Router, routing::get};
use std::path::{Path, PathBuf};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Where the index page and static assets live on disk.
#[derive(Debug, Clone)]
pub struct StaticAssets {
    /// Directory served under `/static`
    pub dir: PathBuf,
    /// Page served at `/`, relative to `dir`
    pub index: PathBuf,
}

impl StaticAssets {
    /// Serve `dir` under `/static` and `dir/index` at `/`.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>, index: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            index: index.as_ref().to_path_buf(),
        }
    }

    /// Full path of the index page.
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        self.dir.join(&self.index)
    }
}

/// Build the application router.
#[must_use]
pub fn router(state: AppState, assets: &StaticAssets) -> Router {
    Router::new()
        .route("/order", get(handlers::get_order))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness))
        .route("/metrics", get(handlers::metrics))
        .route_service("/", ServeFile::new(assets.index_path()))
        .nest_service("/static", ServeDir::new(&assets.dir))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
