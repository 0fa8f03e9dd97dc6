//! # Order Cache Core
//!
//! Record model and boundary traits for the order ingest-persist-cache pipeline.
//!
//! This crate holds everything the other crates agree on and nothing that
//! performs I/O:
//!
//! - [`record`]: the `Order` record and its delivery, payment and item sub-records
//! - [`error`]: the ingest error taxonomy (decode, validation, persistence)
//! - [`store`]: the [`OrderStore`] seam implemented by the durable store
//! - [`source`]: the [`EventSource`] seam and the [`InboundEvent`] / [`Acknowledgement`] pair
//! - [`dead_letter`]: the [`DeadLetterSink`] seam for rejected events
//!
//! ## Data Flow
//!
//! ```text
//! ┌──────────────┐     event     ┌────────────────┐  persist   ┌──────────────┐
//! │ EventSource  │ ────────────▶ │ Ingest Pipeline│ ─────────▶ │  OrderStore  │
//! │ (at-least-   │ ◀──────────── │  (runtime)     │            │  (Postgres)  │
//! │  once)       │     ack       └───────┬────────┘            └──────┬───────┘
//! └──────────────┘                       │ put                        │ load_all
//!                                        ▼                            ▼
//!                                 ┌──────────────┐   get    ┌────────────────┐
//!                                 │  Read Cache  │ ◀─────── │ Lookup Service │
//!                                 └──────────────┘          └────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use order_cache_core::record::Order;
//!
//! let payload = br#"{"order_uid":"b563feb7","items":[{"chrt_id":1}]}"#;
//! let order = Order::decode(payload).unwrap();
//! assert!(order.validate().is_ok());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dead_letter;
pub mod error;
pub mod record;
pub mod source;
pub mod store;

pub use dead_letter::{DeadLetter, DeadLetterError, DeadLetterSink};
pub use error::{IngestError, ValidationError};
pub use record::{Delivery, Item, Order, Payment};
pub use source::{Acknowledgement, DeliveryInfo, EventSource, EventStream, InboundEvent, SourceError};
pub use store::{OrderStore, PersistOutcome, StoreError};

/// Boxed future returned by the dyn-compatible traits in this crate.
pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
