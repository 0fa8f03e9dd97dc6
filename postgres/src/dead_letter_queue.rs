//! Dead letter queue for events that could never be ingested.
//!
//! Provides persistent storage of rejected events (malformed or incomplete
//! payloads) so they can be inspected and replayed by hand instead of being
//! redelivered forever.

use chrono::{DateTime, Utc};
use order_cache_core::{BoxFuture, DeadLetter, DeadLetterError, DeadLetterSink};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

/// A stored dead letter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterEntry {
    /// Unique identifier for this entry
    pub id: i64,
    /// The rejected event and why it was rejected
    pub letter: DeadLetter,
}

/// `PostgreSQL`-based dead letter queue.
///
/// # Example
///
/// ```no_run
/// use order_cache_postgres::PostgresDeadLetterQueue;
///
/// # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
/// let dlq = PostgresDeadLetterQueue::new(pool);
///
/// let recent = dlq.list_recent(20).await?;
/// println!("Rejected events: {}", dlq.count().await?);
/// for entry in recent {
///     println!("{} #{}: {}", entry.letter.channel, entry.letter.sequence, entry.letter.error);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct PostgresDeadLetterQueue {
    pool: PgPool,
}

impl PostgresDeadLetterQueue {
    /// Create a new dead letter queue with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Confirm the `dead_letters` table exists.
    ///
    /// The bundled migration creates it, but a schema created by hand may
    /// only have the four order tables.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Unavailable`] if the table is missing, or
    /// [`DeadLetterError::ReadFailed`] if the catalog cannot be queried.
    pub async fn ensure_table(&self) -> Result<(), DeadLetterError> {
        let (exists,): (bool,) = sqlx::query_as("SELECT to_regclass('dead_letters') IS NOT NULL")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DeadLetterError::ReadFailed(e.to_string()))?;

        if exists {
            Ok(())
        } else {
            Err(DeadLetterError::Unavailable(
                "table dead_letters does not exist".to_string(),
            ))
        }
    }

    /// Add a rejected event to the queue.
    ///
    /// # Returns
    ///
    /// The unique ID of the created entry.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::WriteFailed`] if the insert fails.
    pub async fn add_entry(&self, letter: &DeadLetter) -> Result<i64, DeadLetterError> {
        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO dead_letters (
                channel, partition, sequence, payload, reason, error, failed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            ",
        )
        .bind(&letter.channel)
        .bind(letter.partition)
        .bind(letter.sequence)
        .bind(&letter.payload)
        .bind(&letter.reason)
        .bind(&letter.error)
        .bind(letter.failed_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DeadLetterError::WriteFailed(e.to_string()))?;

        tracing::warn!(
            dlq_id = id,
            channel = %letter.channel,
            sequence = letter.sequence,
            reason = %letter.reason,
            error = %letter.error,
            "Event added to dead letter queue"
        );

        Ok(id)
    }

    /// List the most recent entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::ReadFailed`] if the query fails.
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, DeadLetterError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(
            r"
            SELECT id, channel, partition, sequence, payload, reason, error, failed_at
            FROM dead_letters
            ORDER BY id DESC
            LIMIT $1
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DeadLetterError::ReadFailed(e.to_string()))?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    /// Get a specific entry by ID.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::ReadFailed`] if the query fails or the
    /// entry does not exist.
    pub async fn get_by_id(&self, id: i64) -> Result<DeadLetterEntry, DeadLetterError> {
        let row = sqlx::query(
            r"
            SELECT id, channel, partition, sequence, payload, reason, error, failed_at
            FROM dead_letters
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DeadLetterError::ReadFailed(e.to_string()))?;

        Self::row_to_entry(&row)
    }

    /// Total number of entries.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::ReadFailed`] if the query fails.
    pub async fn count(&self) -> Result<i64, DeadLetterError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM dead_letters")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DeadLetterError::ReadFailed(e.to_string()))?;

        Ok(count)
    }

    fn row_to_entry(row: &PgRow) -> Result<DeadLetterEntry, DeadLetterError> {
        let read = |e: sqlx::Error| DeadLetterError::ReadFailed(e.to_string());
        let failed_at: DateTime<Utc> = row.try_get("failed_at").map_err(read)?;

        Ok(DeadLetterEntry {
            id: row.try_get("id").map_err(read)?,
            letter: DeadLetter {
                channel: row.try_get("channel").map_err(read)?,
                partition: row.try_get("partition").map_err(read)?,
                sequence: row.try_get("sequence").map_err(read)?,
                payload: row.try_get("payload").map_err(read)?,
                reason: row.try_get("reason").map_err(read)?,
                error: row.try_get("error").map_err(read)?,
                failed_at,
            },
        })
    }
}

impl DeadLetterSink for PostgresDeadLetterQueue {
    fn record<'a>(&'a self, letter: &'a DeadLetter) -> BoxFuture<'a, Result<i64, DeadLetterError>> {
        Box::pin(self.add_entry(letter))
    }
}
