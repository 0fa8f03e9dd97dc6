//! HTTP request handlers.

pub mod health;
pub mod metrics;
pub mod order;

pub use health::{health_check, readiness};
pub use metrics::metrics;
pub use order::get_order;
