//! `PostgreSQL` durable store for the order cache.
//!
//! This crate provides:
//!
//! - [`PostgresOrderStore`]: implements `OrderStore` from `order-cache-core`.
//!   Each order is written to the `orders`, `delivery`, `payment` and `items`
//!   tables inside one transaction, keyed by `order_uid`.
//! - [`PostgresDeadLetterQueue`]: implements `DeadLetterSink`, recording
//!   rejected events in the `dead_letters` table.
//! - The bundled schema under `migrations/`, applied by
//!   [`PostgresOrderStore::migrate`].
//!
//! Queries are built at runtime with `sqlx::query`, so no database is needed
//! at compile time.
//!
//! # Example
//!
//! ```ignore
//! use order_cache_postgres::PostgresOrderStore;
//! use std::time::Duration;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresOrderStore::connect(
//!         "postgres://localhost/orders",
//!         10,
//!         Duration::from_secs(30),
//!     )
//!     .await?;
//!     store.migrate().await?;
//!     let orders = store.load_all().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod dead_letter_queue;
mod error;
mod order_store;

pub use dead_letter_queue::{DeadLetterEntry, PostgresDeadLetterQueue};
pub use order_store::PostgresOrderStore;
