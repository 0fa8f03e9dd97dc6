//! Mapping from `sqlx` errors to [`StoreError`].

use order_cache_core::StoreError;

/// Name of the primary key constraint on `orders`.
const ORDERS_PKEY: &str = "orders_pkey";

/// Classify a `sqlx` error, prefixing the message with what was being done.
pub(crate) fn store_error(context: &str, err: &sqlx::Error) -> StoreError {
    let message = format!("{context}: {err}");
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Connection(message),
        sqlx::Error::Database(db) if db.constraint().is_some() => StoreError::Constraint(message),
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_)
        | sqlx::Error::Encode(_) => StoreError::Decode(message),
        _ => StoreError::Database(message),
    }
}

/// Whether `err` is a duplicate insert of an order header, which happens when
/// another writer committed the same `order_uid` after our existence check.
pub(crate) fn is_duplicate_order(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.is_unique_violation() && db.constraint() == Some(ORDERS_PKEY)
        }
        _ => false,
    }
}
