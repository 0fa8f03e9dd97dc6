//! # Order Cache Runtime
//!
//! The moving parts of the order cache: the read cache, the per-event ingest
//! pipeline, the consumer loop that feeds it, and the lookup service.
//!
//! ## Core Components
//!
//! - **[`ReadCache`]**: `order_uid` → fully materialized order, behind a
//!   reader/writer lock
//! - **[`IngestPipeline`]**: drives one event through
//!   `received → decoded → validated → persisted → cached → acknowledged`
//! - **[`IngestConsumer`]**: subscribe → process → reconnect loop with
//!   graceful shutdown
//! - **[`warm_cache`]**: one-time bulk load of the cache from the store
//! - **[`LookupService`]**: point reads against the cache
//!
//! ## Example
//!
//! ```ignore
//! use order_cache_runtime::{IngestConsumer, IngestPipeline, ReadCache, RejectPolicy, warm_cache};
//!
//! let cache = ReadCache::new();
//! warm_cache(store.as_ref(), &cache).await?;
//!
//! let pipeline = IngestPipeline::new(store, cache.clone(), RejectPolicy::LeaveUnacknowledged);
//! let consumer = IngestConsumer::new("orders", source, Arc::new(pipeline), shutdown_rx);
//! let handle = consumer.spawn();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Concurrent read cache of committed orders
pub mod cache;

/// Subscribe-process-reconnect loop
pub mod consumer;

/// Point reads for external callers
pub mod lookup;

/// Prometheus metrics for observability
pub mod metrics;

/// Per-event ingest state machine
pub mod pipeline;

/// Startup bulk load
pub mod warm;

pub use cache::ReadCache;
pub use consumer::{IngestConsumer, StreamEnd};
pub use lookup::{LookupError, LookupService};
pub use pipeline::{Disposition, IngestPipeline, IngestState, RejectPolicy, StateKind};
pub use warm::warm_cache;
