//! Dead-letter seam for events that can never be ingested.
//!
//! Decode and validation failures are permanent: redelivering the same bytes
//! produces the same failure. When the reject policy says so, the ingest
//! pipeline records such an event through a [`DeadLetterSink`] and only then
//! acknowledges it. Persistence failures are never dead-lettered; they stay
//! unacknowledged and are retried by redelivery.

use crate::BoxFuture;
use crate::error::IngestError;
use crate::source::DeliveryInfo;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// A rejected event, ready to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    /// Channel the event came from
    pub channel: String,
    /// Partition within the channel
    pub partition: i32,
    /// Position of the event within its partition
    pub sequence: i64,
    /// Raw payload, exactly as received
    pub payload: Vec<u8>,
    /// Failure kind (`decode` or `validation`)
    pub reason: String,
    /// Human-readable failure message
    pub error: String,
    /// When the event was rejected
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    /// Build a dead letter from a rejected event and its failure.
    #[must_use]
    pub fn new(info: &DeliveryInfo, payload: &[u8], error: &IngestError) -> Self {
        Self {
            channel: info.channel.clone(),
            partition: info.partition,
            sequence: info.sequence,
            payload: payload.to_vec(),
            reason: error.kind().to_string(),
            error: error.to_string(),
            failed_at: Utc::now(),
        }
    }
}

/// Recording a dead letter failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeadLetterError {
    /// The sink could not store the entry
    #[error("Dead letter write failed: {0}")]
    WriteFailed(String),

    /// Stored entries could not be read back
    #[error("Dead letter read failed: {0}")]
    ReadFailed(String),

    /// The sink's backing storage does not exist
    #[error("Dead letter storage unavailable: {0}")]
    Unavailable(String),
}

/// Destination for rejected events.
pub trait DeadLetterSink: Send + Sync {
    /// Record a rejected event.
    ///
    /// Returns the id assigned to the entry.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::WriteFailed`] if the entry was not stored.
    /// The caller must then leave the event unacknowledged.
    fn record<'a>(&'a self, letter: &'a DeadLetter) -> BoxFuture<'a, Result<i64, DeadLetterError>>;
}
