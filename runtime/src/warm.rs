use crate::cache::ReadCache;
use order_cache_core::{OrderStore, StoreError};
use std::time::Instant;

/// Seed the read cache with every committed order.
///
/// Runs once at startup, before the ingest consumer and the HTTP server are
/// started. Returns the number of cached orders.
///
/// # Errors
///
/// Returns [`StoreError`] if the store cannot be read. The server treats
/// this as fatal and does not start.
pub async fn warm_cache(store: &dyn OrderStore, cache: &ReadCache) -> Result<usize, StoreError> {
    let started = Instant::now();
    let orders = store.load_all().await?;
    let loaded = orders.len();
    let cached = cache.extend(orders).await;

    tracing::info!(
        loaded,
        cached,
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "Read cache warmed from store"
    );
    Ok(cached)
}
