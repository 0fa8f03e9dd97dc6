//! Error taxonomy for a single inbound event.
//!
//! Every per-event failure is one of three kinds. None of them is fatal to
//! the process; the ingest pipeline logs them and decides whether the event
//! is acknowledged.

use crate::store::StoreError;
use thiserror::Error;

/// Why an inbound event did not reach the acknowledged state.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The payload is not a well-formed order document
    #[error("Decode failed: {0}")]
    Decode(#[source] serde_json::Error),

    /// The payload decoded but is missing required content
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// The durable write could not complete
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

impl IngestError {
    /// Short, stable label for logs, metrics and dead-letter rows.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Validation(_) => "validation",
            Self::Persistence(_) => "persistence",
        }
    }
}

/// A decoded order that must not be persisted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `order_uid` is empty
    #[error("order_uid is empty")]
    MissingOrderUid,

    /// The order has no line items
    #[error("order {order_uid} has no items")]
    NoItems {
        /// The order that was rejected
        order_uid: String,
    },
}
