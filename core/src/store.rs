//! Durable store abstraction.
//!
//! The [`OrderStore`] trait is the boundary between the ingest pipeline and
//! relational persistence. Implementations must uphold three guarantees:
//!
//! - **Idempotent persist**: persisting an id that is already committed is a
//!   successful no-op, never an overwrite
//! - **All-or-nothing**: the header, delivery, payment and item rows of one
//!   order are committed in a single transaction or not at all
//! - **Commit is the durability boundary**: `persist` returns `Ok` only after
//!   commit, so callers may promote the order into the cache and acknowledge
//!   the event
//!
//! An id that is already present keeps its first committed content. Callers
//! that need the stored version after [`PersistOutcome::AlreadyPresent`]
//! read it back with [`OrderStore::load`].
//!
//! # Dyn Compatibility
//!
//! Like the event source trait, methods return boxed futures so the store can
//! be shared as `Arc<dyn OrderStore>` between the startup loader and the
//! ingest task.

use crate::BoxFuture;
use crate::record::Order;
use thiserror::Error;

/// A durable write that could not complete.
///
/// Every variant carries the underlying cause as text. The event that
/// triggered the write must not be acknowledged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The database could not be reached or the connection dropped
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A row violated a schema constraint
    #[error("Constraint violated: {0}")]
    Constraint(String),

    /// Beginning, committing or rolling back the transaction failed
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// A value could not be encoded for or decoded from the database
    #[error("Row decode failed: {0}")]
    Decode(String),

    /// Any other database error
    #[error("Database error: {0}")]
    Database(String),
}

/// Result of a successful [`OrderStore::persist`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// All rows were written and committed by this call
    Inserted,
    /// The order was already committed; nothing was written
    AlreadyPresent,
}

impl PersistOutcome {
    /// Label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::AlreadyPresent => "already_present",
        }
    }
}

/// Relational persistence of orders.
///
/// # Examples
///
/// ```rust,ignore
/// match store.persist(&order).await? {
///     PersistOutcome::Inserted => tracing::info!(order_uid = %order.order_uid, "Order stored"),
///     PersistOutcome::AlreadyPresent => tracing::debug!("Redelivered order skipped"),
/// }
/// ```
pub trait OrderStore: Send + Sync {
    /// Whether an order with this id is committed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the existence check cannot be performed.
    fn record_exists<'a>(&'a self, order_uid: &'a str) -> BoxFuture<'a, Result<bool, StoreError>>;

    /// Durably persist an order unless it is already present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on connectivity loss, constraint violation or
    /// transaction failure. No rows of the order are visible afterwards.
    fn persist<'a>(&'a self, order: &'a Order) -> BoxFuture<'a, Result<PersistOutcome, StoreError>>;

    /// Load one committed order, fully joined.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be queried.
    fn load<'a>(&'a self, order_uid: &'a str) -> BoxFuture<'a, Result<Option<Order>, StoreError>>;

    /// Load every committed order, fully joined.
    ///
    /// Used once at startup to seed the read cache. Rows that cannot be read
    /// are skipped by the implementation rather than failing the whole load.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be queried at all.
    fn load_all(&self) -> BoxFuture<'_, Result<Vec<Order>, StoreError>>;
}
