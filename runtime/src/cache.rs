//! In-memory mirror of the committed order set.
//!
//! Entries are `Arc<Order>`: a reader copies the reference out under the
//! read lock and never observes a partially built order. There is no
//! eviction; the cache holds every committed order for the life of the
//! process.

use crate::metrics::CacheMetrics;
use order_cache_core::Order;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Read cache keyed by `order_uid`.
///
/// Cloning is cheap and every clone shares the same map.
///
/// # Example
///
/// ```
/// use order_cache_core::Order;
/// use order_cache_runtime::ReadCache;
/// use std::sync::Arc;
///
/// # async fn example() {
/// let cache = ReadCache::new();
/// let order = Order { order_uid: "test2".to_string(), ..Order::default() };
///
/// cache.put("test2".to_string(), Arc::new(order)).await;
/// assert!(cache.get("test2").await.is_some());
/// assert!(cache.get("missing").await.is_none());
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct ReadCache {
    entries: Arc<RwLock<HashMap<String, Arc<Order>>>>,
}

impl ReadCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an order by id.
    pub async fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
        self.entries.read().await.get(order_uid).cloned()
    }

    /// Insert or replace an order. Last writer wins.
    pub async fn put(&self, order_uid: String, order: Arc<Order>) {
        let len = {
            let mut entries = self.entries.write().await;
            entries.insert(order_uid, order);
            entries.len()
        };
        CacheMetrics::record_size(len);
    }

    /// Insert many orders under a single write lock; returns the new size.
    pub async fn extend(&self, orders: impl IntoIterator<Item = Order> + Send) -> usize {
        let len = {
            let mut entries = self.entries.write().await;
            entries.extend(
                orders
                    .into_iter()
                    .map(|order| (order.order_uid.clone(), Arc::new(order))),
            );
            entries.len()
        };
        CacheMetrics::record_size(len);
        len
    }

    /// Whether an order is cached
    pub async fn contains(&self, order_uid: &str) -> bool {
        self.entries.read().await.contains_key(order_uid)
    }

    /// Number of cached orders
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use order_cache_testing::fixtures::sample_order;

    #[tokio::test]
    async fn put_then_get_returns_same_order() {
        let cache = ReadCache::new();
        let order = Arc::new(sample_order("a"));

        cache.put("a".to_string(), Arc::clone(&order)).await;

        let cached = cache.get("a").await.unwrap();
        assert!(Arc::ptr_eq(&cached, &order));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn put_overwrites() {
        let cache = ReadCache::new();
        let mut second = sample_order("a");
        second.track_number = "SECOND".to_string();

        cache.put("a".to_string(), Arc::new(sample_order("a"))).await;
        cache.put("a".to_string(), Arc::new(second)).await;

        assert_eq!(cache.get("a").await.unwrap().track_number, "SECOND");
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn extend_keys_by_order_uid() {
        let cache = ReadCache::new();

        let len = cache
            .extend(vec![sample_order("a"), sample_order("b")])
            .await;

        assert_eq!(len, 2);
        assert!(cache.contains("a").await);
        assert!(cache.contains("b").await);
        assert!(!cache.contains("c").await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_readers_and_writer() {
        let cache = ReadCache::new();
        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for i in 0..100 {
                    let uid = format!("order-{i}");
                    cache.put(uid.clone(), Arc::new(sample_order(&uid))).await;
                }
            })
        };

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    for i in 0..100 {
                        let uid = format!("order-{i}");
                        if let Some(order) = cache.get(&uid).await {
                            assert_eq!(order.order_uid, uid);
                        }
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(cache.len().await, 100);
    }
}
