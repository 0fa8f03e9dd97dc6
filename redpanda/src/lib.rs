//! Redpanda event source for the order cache.
//!
//! This crate provides a Redpanda-based [`EventSource`] that implements the
//! trait from `order-cache-core`, plus a [`RedpandaPublisher`] for writing
//! test messages. It uses rdkafka for Kafka-compatible event streaming.
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with per-event acknowledgement:
//! - The consumer group runs with `enable.auto.commit=false`, so nothing is
//!   committed behind the subscriber's back
//! - New groups start from `earliest`, so a first subscription replays every
//!   event on the channel
//! - Each message is handed to the subscriber with an [`Acknowledgement`] and
//!   the next one is not forwarded until the outcome is known
//! - **Acked**: the partition's commit position may move forward
//! - **Dropped unacked**: the message is kept by the consumer task and
//!   forwarded again after `redelivery_delay`. Later messages keep flowing in
//!   the meantime.
//!
//! Kafka offsets are cumulative, so the committed position of a partition is
//! its lowest unacknowledged offset. If the subscription ends while events are
//! still unacknowledged, the next subscription of the group resumes from that
//! offset and replays them (plus any later events, which the idempotent store
//! absorbs).
//!
//! ```text
//!  poll ──┬──▶ forward ──▶ await outcome ─┬─ acked ───▶ commit(lowest unacked)
//!         │                               │
//!  due ───┘                               └─ dropped ─▶ queue for redelivery
//! ```
//!
//! # Example
//!
//! ```no_run
//! use order_cache_core::EventSource;
//! use order_cache_redpanda::RedpandaEventSource;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = RedpandaEventSource::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("order-cache")
//!     .build()?;
//!
//! let mut stream = source.subscribe("orders").await?;
//! while let Some(result) = stream.next().await {
//!     let event = result?;
//!     println!("Received {} bytes at {}", event.payload.len(), event.info.sequence);
//!     event.ack.ack()?;
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod offsets;
mod publisher;

pub use publisher::RedpandaPublisher;

use offsets::PartitionOffsets;

use order_cache_core::{
    Acknowledgement, BoxFuture, DeliveryInfo, EventSource, EventStream, InboundEvent, SourceError,
};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Default delay before an unacknowledged event is redelivered.
pub const DEFAULT_REDELIVERY_DELAY: Duration = Duration::from_secs(30);

/// Redpanda event source.
///
/// # Configuration
///
/// - **Broker addresses**: Bootstrap servers (required)
/// - **Consumer group**: Durable subscription name (default: `order-cache`)
/// - **Offset reset**: Where new groups start reading (default: `earliest`)
/// - **Redelivery delay**: How long an unacked event waits before it is
///   delivered again (default: 30 seconds)
///
/// # Example
///
/// ```no_run
/// use order_cache_redpanda::RedpandaEventSource;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let source = RedpandaEventSource::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .consumer_group("order-cache")
///     .redelivery_delay(Duration::from_secs(5))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RedpandaEventSource {
    brokers: String,
    consumer_group: String,
    auto_offset_reset: String,
    session_timeout: Duration,
    redelivery_delay: Duration,
}

impl RedpandaEventSource {
    /// Create a new event source with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::ConnectionFailed`] if `brokers` is empty.
    pub fn new(brokers: &str) -> Result<Self, SourceError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event source.
    #[must_use]
    pub fn builder() -> RedpandaEventSourceBuilder {
        RedpandaEventSourceBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Get the consumer group id.
    #[must_use]
    pub fn consumer_group(&self) -> &str {
        &self.consumer_group
    }

    /// Get the redelivery delay for unacknowledged events.
    #[must_use]
    pub const fn redelivery_delay(&self) -> Duration {
        self.redelivery_delay
    }

    /// Fetch cluster metadata to confirm the brokers are reachable.
    ///
    /// Subscriptions retry on their own; this is for failing fast at startup.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::ConnectionFailed`] if no broker answers within
    /// `timeout`.
    pub async fn check_connection(&self, timeout: Duration) -> Result<(), SourceError> {
        let brokers = self.brokers.clone();
        let result = tokio::task::spawn_blocking(move || {
            let consumer: BaseConsumer = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .create()
                .map_err(|e| SourceError::ConnectionFailed(format!("Failed to create client: {e}")))?;
            consumer
                .fetch_metadata(None, Timeout::After(timeout))
                .map(|metadata| metadata.brokers().len())
                .map_err(|e| SourceError::ConnectionFailed(format!("Brokers unreachable: {e}")))
        })
        .await
        .map_err(|e| SourceError::ConnectionFailed(format!("Metadata task failed: {e}")))?;

        let broker_count = result?;
        tracing::info!(brokers = %self.brokers, broker_count, "Redpanda cluster reachable");
        Ok(())
    }

    fn create_consumer(&self, channel: &str) -> Result<StreamConsumer, SourceError> {
        let session_timeout = self.session_timeout.as_millis().to_string();

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.consumer_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("session.timeout.ms", &session_timeout)
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| SourceError::SubscriptionFailed {
                channel: channel.to_string(),
                reason: format!("Failed to create consumer: {e}"),
            })?;

        consumer
            .subscribe(&[channel])
            .map_err(|e| SourceError::SubscriptionFailed {
                channel: channel.to_string(),
                reason: format!("Failed to subscribe to topic: {e}"),
            })?;

        Ok(consumer)
    }
}

/// Builder for configuring a [`RedpandaEventSource`].
#[derive(Default)]
pub struct RedpandaEventSourceBuilder {
    brokers: Option<String>,
    consumer_group: Option<String>,
    auto_offset_reset: Option<String>,
    session_timeout: Option<Duration>,
    redelivery_delay: Option<Duration>,
}

impl RedpandaEventSourceBuilder {
    /// Set the broker addresses.
    ///
    /// # Parameters
    ///
    /// - `brokers`: Comma-separated list of broker addresses (e.g., "localhost:9092")
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the consumer group ID.
    ///
    /// The group is the durable subscription: committed offsets are kept per
    /// group, so restarting with the same group resumes after the last
    /// acknowledged event.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Set the auto offset reset policy for new consumer groups.
    ///
    /// - `"earliest"`: Start from the beginning of the topic (default)
    /// - `"latest"`: Start from the end (only new events)
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Set the consumer session timeout.
    ///
    /// Default: 6 seconds
    #[must_use]
    pub const fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Set how long an unacknowledged event waits before redelivery.
    ///
    /// Default: [`DEFAULT_REDELIVERY_DELAY`]
    #[must_use]
    pub const fn redelivery_delay(mut self, delay: Duration) -> Self {
        self.redelivery_delay = Some(delay);
        self
    }

    /// Build the [`RedpandaEventSource`].
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::ConnectionFailed`] if brokers are not set.
    pub fn build(self) -> Result<RedpandaEventSource, SourceError> {
        let brokers = self
            .brokers
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| SourceError::ConnectionFailed("Brokers not configured".to_string()))?;

        let source = RedpandaEventSource {
            brokers,
            consumer_group: self
                .consumer_group
                .unwrap_or_else(|| "order-cache".to_string()),
            auto_offset_reset: self
                .auto_offset_reset
                .unwrap_or_else(|| "earliest".to_string()),
            session_timeout: self.session_timeout.unwrap_or(Duration::from_secs(6)),
            redelivery_delay: self.redelivery_delay.unwrap_or(DEFAULT_REDELIVERY_DELAY),
        };

        tracing::info!(
            brokers = %source.brokers,
            consumer_group = %source.consumer_group,
            auto_offset_reset = %source.auto_offset_reset,
            redelivery_delay_ms = u64::try_from(source.redelivery_delay.as_millis()).unwrap_or(u64::MAX),
            "RedpandaEventSource created"
        );

        Ok(source)
    }
}

impl EventSource for RedpandaEventSource {
    fn subscribe<'a>(&'a self, channel: &'a str) -> BoxFuture<'a, Result<EventStream, SourceError>> {
        Box::pin(async move {
            let consumer = self.create_consumer(channel)?;
            let redelivery_delay = self.redelivery_delay;

            tracing::info!(
                channel,
                consumer_group = %self.consumer_group,
                manual_commit = true,
                "Subscribed to channel"
            );

            // One slot: the next message is only polled once the previous
            // outcome is known
            let (tx, rx) = tokio::sync::mpsc::channel(1);
            let topic = channel.to_string();

            // Spawn a task that owns the consumer and forwards messages
            tokio::spawn(async move {
                use futures::StreamExt;

                let mut stream = consumer.stream();
                let mut offsets = PartitionOffsets::default();
                let mut redeliveries: VecDeque<Pending> = VecDeque::new();

                loop {
                    let due = redeliveries.front().map(|pending| pending.due);

                    let pending = tokio::select! {
                        biased;

                        () = wait_until(due) => match redeliveries.pop_front() {
                            Some(pending) => pending,
                            None => continue,
                        },

                        msg_result = stream.next() => match msg_result {
                            None => break,
                            Some(Err(e)) => {
                                let err = SourceError::Transport(format!("Failed to receive message: {e}"));
                                if tx.send(Err(err)).await.is_err() {
                                    break;
                                }
                                continue;
                            }
                            Some(Ok(message)) => {
                                offsets.delivered(message.partition(), message.offset());
                                Pending {
                                    partition: message.partition(),
                                    offset: message.offset(),
                                    payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                                    attempt: 1,
                                    due: Instant::now(),
                                }
                            }
                        },
                    };

                    let (ack, outcome) = Acknowledgement::channel();
                    let info = DeliveryInfo {
                        channel: topic.clone(),
                        partition: pending.partition,
                        sequence: pending.offset,
                    };

                    if tx
                        .send(Ok(InboundEvent::new(pending.payload.clone(), info, ack)))
                        .await
                        .is_err()
                    {
                        tracing::debug!("Subscriber dropped, exiting consumer task");
                        break;
                    }

                    if outcome.await.is_ok() {
                        if let Some(position) = offsets.acked(pending.partition, pending.offset) {
                            commit(&consumer, &topic, pending.partition, position);
                        }
                        continue;
                    }

                    if tx.is_closed() {
                        break;
                    }

                    tracing::debug!(
                        topic = %topic,
                        partition = pending.partition,
                        offset = pending.offset,
                        attempt = pending.attempt,
                        outstanding = offsets.outstanding(pending.partition),
                        delay_ms = u64::try_from(redelivery_delay.as_millis()).unwrap_or(u64::MAX),
                        "Event left unacknowledged, scheduling redelivery"
                    );
                    redeliveries.push_back(Pending {
                        attempt: pending.attempt + 1,
                        due: Instant::now() + redelivery_delay,
                        ..pending
                    });
                }

                tracing::debug!(
                    topic = %topic,
                    awaiting_redelivery = redeliveries.len(),
                    "Consumer task exiting"
                );
                for pending in &redeliveries {
                    tracing::debug!(
                        topic = %topic,
                        partition = pending.partition,
                        resume_offset = offsets.commit_position(pending.partition),
                        "Uncommitted offsets will be replayed on next subscription"
                    );
                }
            });

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as EventStream)
        })
    }
}

/// An event forwarded at least once and possibly waiting for redelivery.
struct Pending {
    partition: i32,
    offset: i64,
    payload: Vec<u8>,
    attempt: u32,
    due: Instant,
}

/// Resolve at `due`, or never when nothing is scheduled.
async fn wait_until(due: Option<Instant>) {
    match due {
        Some(due) => tokio::time::sleep_until(due).await,
        None => std::future::pending().await,
    }
}

/// Commit `position` as the next offset to read on `partition`.
fn commit(consumer: &StreamConsumer, topic: &str, partition: i32, position: i64) {
    let mut list = TopicPartitionList::new();
    if let Err(e) = list.add_partition_offset(topic, partition, Offset::Offset(position)) {
        tracing::warn!(topic, partition, position, error = %e, "Invalid commit position");
        return;
    }
    if let Err(e) = consumer.commit(&list, CommitMode::Async) {
        tracing::warn!(
            topic,
            partition,
            position,
            error = %e,
            "Failed to commit offset (events may be redelivered)"
        );
    }
}
