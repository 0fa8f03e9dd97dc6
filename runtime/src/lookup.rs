//! Point reads of the read cache for external callers.

use crate::cache::ReadCache;
use crate::metrics::LookupMetrics;
use order_cache_core::Order;
use std::sync::Arc;
use thiserror::Error;

/// Why a lookup returned no order.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The id parameter was missing or empty
    #[error("order id is required")]
    BadRequest,

    /// No cached order has this id
    #[error("order {0} not found")]
    NotFound(String),
}

/// Read-only access to cached orders.
///
/// Never touches the durable store and has no side effects beyond metrics.
#[derive(Clone, Debug)]
pub struct LookupService {
    cache: ReadCache,
}

impl LookupService {
    /// Create a lookup service over `cache`.
    #[must_use]
    pub const fn new(cache: ReadCache) -> Self {
        Self { cache }
    }

    /// Find an order by id.
    ///
    /// # Errors
    ///
    /// - [`LookupError::BadRequest`] if `order_uid` is `None` or empty
    /// - [`LookupError::NotFound`] if the id is not cached
    pub async fn lookup(&self, order_uid: Option<&str>) -> Result<Arc<Order>, LookupError> {
        let Some(order_uid) = order_uid.filter(|id| !id.is_empty()) else {
            LookupMetrics::record("bad_request");
            return Err(LookupError::BadRequest);
        };

        match self.cache.get(order_uid).await {
            Some(order) => {
                LookupMetrics::record("hit");
                Ok(order)
            }
            None => {
                LookupMetrics::record("miss");
                tracing::debug!(order_uid, "Order not in cache");
                Err(LookupError::NotFound(order_uid.to_string()))
            }
        }
    }

    /// Number of orders available for lookup.
    pub async fn cached_orders(&self) -> usize {
        self.cache.len().await
    }
}
