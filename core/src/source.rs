//! Event source abstraction for inbound order events.
//!
//! An [`EventSource`] is a durable, replayable channel with at-least-once
//! delivery and explicit acknowledgement. Each item of a subscription is an
//! [`InboundEvent`] carrying the raw payload and a one-shot
//! [`Acknowledgement`].
//!
//! # Delivery Semantics
//!
//! ```text
//! ┌──────────────┐  InboundEvent   ┌──────────────┐
//! │    Source    │ ──────────────▶ │   Consumer   │
//! │              │                 │              │
//! │  waits for   │ ◀────────────── │ ack() only   │
//! │  outcome     │   ack / drop    │ after commit │
//! └──────────────┘                 └──────────────┘
//! ```
//!
//! - Calling [`Acknowledgement::ack`] tells the source the event is done.
//! - Dropping an event without acking leaves it unacknowledged; the source
//!   redelivers it according to its own policy.
//! - Consumers must be idempotent: the same payload may arrive more than once.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//!
//! let mut stream = source.subscribe("orders").await?;
//! while let Some(result) = stream.next().await {
//!     let event = result?;
//!     handle(&event.payload).await?;
//!     event.ack.ack()?;
//! }
//! ```

use crate::BoxFuture;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors that can occur at the event source boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Failed to connect to the source
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to subscribe to a channel
    #[error("Subscription failed for channel '{channel}': {reason}")]
    SubscriptionFailed {
        /// The channel that failed
        channel: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to publish to a channel
    #[error("Publish failed for channel '{channel}': {reason}")]
    PublishFailed {
        /// The channel that failed
        channel: String,
        /// The reason for failure
        reason: String,
    },

    /// Network or transport error while receiving
    #[error("Transport error: {0}")]
    Transport(String),

    /// The acknowledgement could not be delivered to the source
    #[error("Acknowledgement failed: {0}")]
    AckFailed(String),
}

/// Where an inbound event came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryInfo {
    /// Channel (topic) name
    pub channel: String,
    /// Partition within the channel
    pub partition: i32,
    /// Position of the event within its partition
    pub sequence: i64,
}

/// One-shot acknowledgement handle for an inbound event.
///
/// Consumed by [`ack`](Self::ack), so an event can be acknowledged at most
/// once. Dropping it without calling `ack` leaves the event unacknowledged.
#[derive(Debug)]
pub struct Acknowledgement {
    tx: oneshot::Sender<()>,
}

impl Acknowledgement {
    /// Create an acknowledgement handle and the receiver the source waits on.
    ///
    /// The receiver resolves to `Ok(())` when acked and to an error when the
    /// handle is dropped unacknowledged.
    #[must_use]
    pub fn channel() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Acknowledge the event.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::AckFailed`] if the source is no longer waiting
    /// for this acknowledgement (for example, its consumer task has exited).
    pub fn ack(self) -> Result<(), SourceError> {
        self.tx.send(()).map_err(|()| {
            SourceError::AckFailed("source is no longer awaiting this event".to_string())
        })
    }
}

/// A single event received from a subscription.
#[derive(Debug)]
pub struct InboundEvent {
    /// Raw payload bytes
    pub payload: Vec<u8>,
    /// Origin of the event
    pub info: DeliveryInfo,
    /// Acknowledgement handle
    pub ack: Acknowledgement,
}

impl InboundEvent {
    /// Create a new inbound event.
    #[must_use]
    pub const fn new(payload: Vec<u8>, info: DeliveryInfo, ack: Acknowledgement) -> Self {
        Self { payload, info, ack }
    }
}

/// Stream of inbound events from a subscription.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<InboundEvent, SourceError>> + Send>>;

/// A durable channel of order events.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so the source can be shared as
/// `Arc<dyn EventSource>` with the ingest consumer.
pub trait EventSource: Send + Sync {
    /// Subscribe to a channel.
    ///
    /// The subscription is durable: every event not yet acknowledged is
    /// replayed first, then new events follow in delivery order.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::SubscriptionFailed`] if the subscription cannot
    /// be created.
    fn subscribe<'a>(&'a self, channel: &'a str) -> BoxFuture<'a, Result<EventStream, SourceError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> DeliveryInfo {
        DeliveryInfo {
            channel: "orders".to_string(),
            partition: 0,
            sequence: 7,
        }
    }

    #[tokio::test]
    async fn ack_resolves_receiver() {
        let (ack, rx) = Acknowledgement::channel();
        let event = InboundEvent::new(b"{}".to_vec(), info(), ack);

        tokio_test::assert_ok!(event.ack.ack());
        tokio_test::assert_ok!(rx.await);
    }

    #[tokio::test]
    async fn dropping_event_leaves_it_unacknowledged() {
        let (ack, rx) = Acknowledgement::channel();
        let event = InboundEvent::new(b"{}".to_vec(), info(), ack);

        drop(event);
        tokio_test::assert_err!(rx.await);
    }

    #[test]
    fn ack_fails_when_source_is_gone() {
        let (ack, rx) = Acknowledgement::channel();
        drop(rx);

        assert!(matches!(ack.ack(), Err(SourceError::AckFailed(_))));
    }

    #[test]
    fn event_source_is_dyn_compatible() {
        fn assert_dyn(_: Option<&dyn EventSource>) {}
        assert_dyn(None);
    }
}
