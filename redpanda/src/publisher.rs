//! Producer side, used to put test orders on a channel.

use order_cache_core::SourceError;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;

/// Publishes raw payloads to a Redpanda topic.
///
/// # Example
///
/// ```no_run
/// use order_cache_redpanda::RedpandaPublisher;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let publisher = RedpandaPublisher::new("localhost:9092")?;
/// publisher.publish("orders", Some("test2"), br#"{"order_uid":"test2"}"#).await?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaPublisher {
    producer: FutureProducer,
    timeout: Duration,
}

impl RedpandaPublisher {
    /// Create a publisher with leader acks and a 5 second send timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::ConnectionFailed`] if the producer cannot be created.
    pub fn new(brokers: &str) -> Result<Self, SourceError> {
        Self::with_timeout(brokers, Duration::from_secs(5))
    }

    /// Create a publisher with a custom send timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::ConnectionFailed`] if the producer cannot be created.
    pub fn with_timeout(brokers: &str, timeout: Duration) -> Result<Self, SourceError> {
        let timeout_ms = timeout.as_millis().to_string();
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", &timeout_ms)
            .set("acks", "1")
            .create()
            .map_err(|e| SourceError::ConnectionFailed(format!("Failed to create producer: {e}")))?;

        Ok(Self { producer, timeout })
    }

    /// Publish a payload, returning the partition and offset it landed at.
    ///
    /// Messages with the same key go to the same partition.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::PublishFailed`] if the broker rejects the
    /// message or the send times out.
    pub async fn publish(
        &self,
        channel: &str,
        key: Option<&str>,
        payload: &[u8],
    ) -> Result<(i32, i64), SourceError> {
        let mut record: FutureRecord<'_, str, [u8]> = FutureRecord::to(channel).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }

        match self.producer.send(record, Timeout::After(self.timeout)).await {
            Ok((partition, offset)) => {
                tracing::debug!(channel, partition, offset, "Payload published");
                Ok((partition, offset))
            }
            Err((kafka_error, _)) => {
                tracing::error!(channel, error = %kafka_error, "Failed to publish payload");
                Err(SourceError::PublishFailed {
                    channel: channel.to_string(),
                    reason: kafka_error.to_string(),
                })
            }
        }
    }
}
