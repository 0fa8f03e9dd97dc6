//! # Order Cache Testing
//!
//! Testing utilities for the order ingest-persist-cache pipeline.
//!
//! This crate provides:
//! - [`InMemoryOrderStore`]: `HashMap`-backed [`OrderStore`](order_cache_core::OrderStore)
//!   with write-failure injection and call counters
//! - [`InMemoryEventSource`]: durable, replayable [`EventSource`](order_cache_core::EventSource)
//!   that tracks acknowledgements and redelivers unacked events on resubscribe
//! - [`RecordingDeadLetterSink`]: captures dead letters, can be told to fail
//! - [`fixtures`]: sample orders and payloads
//! - [`properties`]: proptest strategies for orders
//!
//! ## Example
//!
//! ```ignore
//! use order_cache_testing::{InMemoryEventSource, InMemoryOrderStore, fixtures};
//!
//! #[tokio::test]
//! async fn test_ingest() {
//!     let source = InMemoryEventSource::new();
//!     let store = InMemoryOrderStore::new();
//!
//!     source.publish_order("orders", &fixtures::sample_order("test2"));
//!     source.close();
//!
//!     // ... run the consumer, then:
//!     assert!(store.contains("test2"));
//!     assert_eq!(source.pending("orders"), 0);
//! }
//! ```

mod dead_letter;
mod event_source;
mod order_store;

pub mod fixtures;
pub mod properties;

pub use dead_letter::RecordingDeadLetterSink;
pub use event_source::InMemoryEventSource;
pub use order_store::{InMemoryOrderStore, WriteStage};

/// Install a compact tracing subscriber for tests.
///
/// Honors `RUST_LOG`. Safe to call from every test; only the first call
/// installs the subscriber.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
