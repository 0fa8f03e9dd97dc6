//! Per-event ingest state machine.
//!
//! Every inbound event is driven through an explicit [`IngestState`]:
//!
//! ```text
//! Received ─▶ Decoded ─▶ Validated ─▶ Persisted ─▶ Cached ─▶ [Acknowledged]
//!    │           │            │
//!    └───────────┴─▶ [Rejected]└─▶ [Failed]
//! ```
//!
//! Terminal states are bracketed. The acknowledgement handle travels inside
//! the state and is only consumed on the `Cached → Acknowledged` step, so an
//! event cannot be acknowledged before its order is committed and cached.
//! Leaving the happy path drops the handle, which leaves the event
//! unacknowledged for the source to redeliver. The one exception is a
//! rejected event under [`RejectPolicy::DeadLetter`]: once it is recorded in
//! the dead-letter sink it is acknowledged, since redelivering the same bytes
//! cannot succeed.

use crate::cache::ReadCache;
use crate::metrics::IngestMetrics;
use order_cache_core::{
    DeadLetter, DeadLetterSink, InboundEvent, IngestError, Order, OrderStore, PersistOutcome,
    SourceError, StoreError,
};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// What happens to events that fail decoding or validation.
#[derive(Clone)]
pub enum RejectPolicy {
    /// Record the event in the sink, then acknowledge it. If the sink write
    /// fails the event stays unacknowledged.
    DeadLetter(Arc<dyn DeadLetterSink>),
    /// Leave the event unacknowledged; the source keeps redelivering it.
    LeaveUnacknowledged,
}

impl fmt::Debug for RejectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeadLetter(_) => f.write_str("DeadLetter"),
            Self::LeaveUnacknowledged => f.write_str("LeaveUnacknowledged"),
        }
    }
}

/// How a rejected event left the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Recorded as a dead letter and acknowledged
    DeadLettered {
        /// Id assigned by the sink
        id: i64,
        /// Set if the acknowledgement did not reach the source
        ack_error: Option<SourceError>,
    },
    /// Not acknowledged; the source will redeliver it
    Unacknowledged,
}

/// State of one event in the pipeline.
#[derive(Debug)]
pub enum IngestState {
    /// Event received, payload not yet inspected
    Received(InboundEvent),
    /// Payload decoded into an order
    Decoded {
        /// The event being processed
        event: InboundEvent,
        /// Decoded order
        order: Order,
    },
    /// Order is complete enough to persist
    Validated {
        /// The event being processed
        event: InboundEvent,
        /// Validated order
        order: Order,
    },
    /// Order is committed to the durable store
    Persisted {
        /// The event being processed
        event: InboundEvent,
        /// Committed order
        order: Arc<Order>,
        /// Whether this event wrote the order
        outcome: PersistOutcome,
    },
    /// Order is visible to lookups
    Cached {
        /// The event being processed
        event: InboundEvent,
        /// Cached order id
        order_uid: String,
        /// Whether this event wrote the order
        outcome: PersistOutcome,
    },
    /// Terminal: event acknowledged
    Acknowledged {
        /// Order id
        order_uid: String,
        /// Whether this event wrote the order
        outcome: PersistOutcome,
        /// Set if the acknowledgement did not reach the source. The order is
        /// still durable and cached.
        ack_error: Option<SourceError>,
    },
    /// Terminal: payload malformed or incomplete
    Rejected {
        /// Decode or validation failure
        error: IngestError,
        /// What happened to the event
        disposition: Disposition,
    },
    /// Terminal: the durable write failed; event left unacknowledged
    Failed {
        /// Order id
        order_uid: String,
        /// Persistence failure
        error: IngestError,
    },
}

/// Discriminant of [`IngestState`], for assertions and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    /// See [`IngestState::Received`]
    Received,
    /// See [`IngestState::Decoded`]
    Decoded,
    /// See [`IngestState::Validated`]
    Validated,
    /// See [`IngestState::Persisted`]
    Persisted,
    /// See [`IngestState::Cached`]
    Cached,
    /// See [`IngestState::Acknowledged`]
    Acknowledged,
    /// See [`IngestState::Rejected`]
    Rejected,
    /// See [`IngestState::Failed`]
    Failed,
}

impl StateKind {
    /// Lowercase label for logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Decoded => "decoded",
            Self::Validated => "validated",
            Self::Persisted => "persisted",
            Self::Cached => "cached",
            Self::Acknowledged => "acknowledged",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

impl IngestState {
    /// Discriminant of this state.
    #[must_use]
    pub const fn kind(&self) -> StateKind {
        match self {
            Self::Received(_) => StateKind::Received,
            Self::Decoded { .. } => StateKind::Decoded,
            Self::Validated { .. } => StateKind::Validated,
            Self::Persisted { .. } => StateKind::Persisted,
            Self::Cached { .. } => StateKind::Cached,
            Self::Acknowledged { .. } => StateKind::Acknowledged,
            Self::Rejected { .. } => StateKind::Rejected,
            Self::Failed { .. } => StateKind::Failed,
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Acknowledged { .. } | Self::Rejected { .. } | Self::Failed { .. }
        )
    }
}

/// Drives inbound events from receipt to a terminal state.
///
/// Holds no per-event state; one pipeline serves the whole consumer.
#[derive(Clone)]
pub struct IngestPipeline {
    store: Arc<dyn OrderStore>,
    cache: ReadCache,
    reject_policy: RejectPolicy,
}

impl IngestPipeline {
    /// Create a pipeline writing to `store` and promoting into `cache`.
    #[must_use]
    pub fn new(store: Arc<dyn OrderStore>, cache: ReadCache, reject_policy: RejectPolicy) -> Self {
        Self {
            store,
            cache,
            reject_policy,
        }
    }

    /// The cache this pipeline promotes into.
    #[must_use]
    pub const fn cache(&self) -> &ReadCache {
        &self.cache
    }

    /// Run one event to a terminal state.
    ///
    /// Never returns an error: every failure is a terminal state, logged
    /// here and counted in `ingest_events_total`.
    pub async fn process(&self, event: InboundEvent) -> IngestState {
        let channel = event.info.channel.clone();
        let sequence = event.info.sequence;

        let mut state = IngestState::Received(event);
        while !state.is_terminal() {
            state = self.advance(state).await;
            tracing::trace!(channel = %channel, sequence, state = state.kind().as_str(), "Ingest step");
        }

        match &state {
            IngestState::Acknowledged {
                order_uid, outcome, ..
            } => {
                tracing::info!(
                    channel = %channel,
                    sequence,
                    order_uid = %order_uid,
                    outcome = outcome.as_str(),
                    "Order ingested"
                );
            }
            IngestState::Rejected { error, disposition } => {
                tracing::warn!(
                    channel = %channel,
                    sequence,
                    kind = error.kind(),
                    error = %error,
                    disposition = ?disposition,
                    "Event rejected"
                );
            }
            IngestState::Failed { order_uid, error } => {
                tracing::error!(
                    channel = %channel,
                    sequence,
                    order_uid = %order_uid,
                    error = %error,
                    "Order not persisted, event left for redelivery"
                );
            }
            _ => {}
        }
        IngestMetrics::record_outcome(state.kind().as_str());

        state
    }

    /// Perform a single transition. Terminal states are returned unchanged.
    pub async fn advance(&self, state: IngestState) -> IngestState {
        match state {
            IngestState::Received(event) => match Order::decode(&event.payload) {
                Ok(order) => IngestState::Decoded { event, order },
                Err(error) => self.reject(event, error).await,
            },

            IngestState::Decoded { event, order } => match order.validate() {
                Ok(()) => IngestState::Validated { event, order },
                Err(error) => self.reject(event, error.into()).await,
            },

            IngestState::Validated { event, order } => {
                let started = Instant::now();
                let result = self.store.persist(&order).await;
                IngestMetrics::record_persist(started.elapsed());

                match result {
                    Ok(PersistOutcome::Inserted) => IngestState::Persisted {
                        event,
                        order: Arc::new(order),
                        outcome: PersistOutcome::Inserted,
                    },
                    Ok(PersistOutcome::AlreadyPresent) => {
                        IngestMetrics::record_duplicate();
                        self.committed(event, order).await
                    }
                    // Dropping the event leaves it unacknowledged
                    Err(error) => IngestState::Failed {
                        order_uid: order.order_uid,
                        error: error.into(),
                    },
                }
            }

            // Promoted even when already present, so a restart that missed
            // the order in the bulk load still ends up caching it
            IngestState::Persisted {
                event,
                order,
                outcome,
            } => {
                let order_uid = order.order_uid.clone();
                self.cache.put(order_uid.clone(), order).await;
                IngestState::Cached {
                    event,
                    order_uid,
                    outcome,
                }
            }

            IngestState::Cached {
                event,
                order_uid,
                outcome,
            } => {
                let ack_error = event.ack.ack().err();
                if let Some(e) = &ack_error {
                    IngestMetrics::record_ack_failure();
                    tracing::warn!(order_uid = %order_uid, error = %e, "Acknowledgement failed");
                }
                IngestState::Acknowledged {
                    order_uid,
                    outcome,
                    ack_error,
                }
            }

            terminal @ (IngestState::Acknowledged { .. }
            | IngestState::Rejected { .. }
            | IngestState::Failed { .. }) => terminal,
        }
    }

    /// Replace a redelivered order with the version the store committed first.
    async fn committed(&self, event: InboundEvent, redelivered: Order) -> IngestState {
        let order_uid = redelivered.order_uid.clone();
        match self.store.load(&order_uid).await {
            Ok(Some(stored)) => {
                if stored != redelivered {
                    tracing::warn!(
                        order_uid = %order_uid,
                        "Redelivered order differs from the stored one, keeping the stored version"
                    );
                }
                IngestState::Persisted {
                    event,
                    order: Arc::new(stored),
                    outcome: PersistOutcome::AlreadyPresent,
                }
            }
            Ok(None) => {
                let error =
                    StoreError::Database(format!("order {order_uid} reported present but not found"));
                IngestState::Failed {
                    order_uid,
                    error: error.into(),
                }
            }
            Err(error) => IngestState::Failed {
                order_uid,
                error: error.into(),
            },
        }
    }

    async fn reject(&self, event: InboundEvent, error: IngestError) -> IngestState {
        let RejectPolicy::DeadLetter(sink) = &self.reject_policy else {
            return IngestState::Rejected {
                error,
                disposition: Disposition::Unacknowledged,
            };
        };

        let letter = DeadLetter::new(&event.info, &event.payload, &error);
        let disposition = match sink.record(&letter).await {
            Ok(id) => {
                IngestMetrics::record_dead_letter();
                let ack_error = event.ack.ack().err();
                if let Some(e) = &ack_error {
                    IngestMetrics::record_ack_failure();
                    tracing::warn!(dead_letter_id = id, error = %e, "Acknowledgement failed");
                }
                Disposition::DeadLettered { id, ack_error }
            }
            Err(e) => {
                tracing::error!(
                    channel = %letter.channel,
                    sequence = letter.sequence,
                    error = %e,
                    "Dead letter write failed, event left for redelivery"
                );
                Disposition::Unacknowledged
            }
        };

        IngestState::Rejected { error, disposition }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Test code can use unwrap and panic
mod tests {
    use super::*;
    use order_cache_core::{Acknowledgement, DeliveryInfo};
    use order_cache_testing::fixtures::{encode, sample_order, sample_payload};
    use order_cache_testing::{InMemoryOrderStore, RecordingDeadLetterSink, WriteStage};
    use tokio::sync::oneshot;

    fn event(payload: Vec<u8>) -> (InboundEvent, oneshot::Receiver<()>) {
        let (ack, rx) = Acknowledgement::channel();
        let info = DeliveryInfo {
            channel: "orders".to_string(),
            partition: 0,
            sequence: 1,
        };
        (InboundEvent::new(payload, info, ack), rx)
    }

    fn pipeline(store: &InMemoryOrderStore, policy: RejectPolicy) -> IngestPipeline {
        IngestPipeline::new(Arc::new(store.clone()), ReadCache::new(), policy)
    }

    #[tokio::test]
    async fn valid_event_walks_every_state() {
        let store = InMemoryOrderStore::new();
        let pipeline = pipeline(&store, RejectPolicy::LeaveUnacknowledged);
        let (event, _rx) = event(sample_payload("test2"));

        let mut state = IngestState::Received(event);
        let mut kinds = vec![state.kind()];
        while !state.is_terminal() {
            state = pipeline.advance(state).await;
            kinds.push(state.kind());
        }

        assert_eq!(
            kinds,
            vec![
                StateKind::Received,
                StateKind::Decoded,
                StateKind::Validated,
                StateKind::Persisted,
                StateKind::Cached,
                StateKind::Acknowledged,
            ]
        );
    }

    #[tokio::test]
    async fn ack_happens_only_after_commit_and_cache() {
        let store = InMemoryOrderStore::new();
        let pipeline = pipeline(&store, RejectPolicy::LeaveUnacknowledged);
        let (event, mut rx) = event(sample_payload("test2"));

        let mut state = IngestState::Received(event);
        while state.kind() != StateKind::Cached {
            state = pipeline.advance(state).await;
            assert!(rx.try_recv().is_err(), "acked early at {:?}", state.kind());
        }
        assert!(store.contains("test2"));
        assert!(pipeline.cache().contains("test2").await);

        let state = pipeline.advance(state).await;
        assert_eq!(state.kind(), StateKind::Acknowledged);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected_without_ack() {
        let store = InMemoryOrderStore::new();
        let pipeline = pipeline(&store, RejectPolicy::LeaveUnacknowledged);
        let (event, rx) = event(b"{not json".to_vec());

        let state = pipeline.process(event).await;

        let IngestState::Rejected { error, disposition } = state else {
            panic!("expected Rejected, got {:?}", state.kind());
        };
        assert_eq!(error.kind(), "decode");
        assert_eq!(disposition, Disposition::Unacknowledged);
        assert!(rx.await.is_err());
        assert_eq!(store.persist_calls(), 0);
    }

    #[tokio::test]
    async fn invalid_orders_are_never_persisted_or_cached() {
        let store = InMemoryOrderStore::new();
        let pipeline = pipeline(&store, RejectPolicy::LeaveUnacknowledged);

        let mut no_uid = sample_order("x");
        no_uid.order_uid.clear();
        let mut no_items = sample_order("no-items");
        no_items.items.clear();

        for order in [no_uid, no_items] {
            let (event, rx) = event(encode(&order));
            let state = pipeline.process(event).await;
            assert_eq!(state.kind(), StateKind::Rejected);
            assert!(rx.await.is_err());
        }

        assert_eq!(store.persist_calls(), 0);
        assert!(pipeline.cache().is_empty().await);
    }

    #[tokio::test]
    async fn rejected_event_is_dead_lettered_then_acked() {
        let store = InMemoryOrderStore::new();
        let sink = RecordingDeadLetterSink::new();
        let pipeline = pipeline(&store, RejectPolicy::DeadLetter(Arc::new(sink.clone())));
        let (event, rx) = event(br#"{"order_uid":"","items":[]}"#.to_vec());

        let state = pipeline.process(event).await;

        let IngestState::Rejected { disposition, .. } = state else {
            panic!("expected Rejected, got {:?}", state.kind());
        };
        assert_eq!(
            disposition,
            Disposition::DeadLettered {
                id: 1,
                ack_error: None
            }
        );
        assert!(rx.await.is_ok());

        let letters = sink.letters();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].reason, "validation");
        assert_eq!(letters[0].payload, br#"{"order_uid":"","items":[]}"#.to_vec());
    }

    #[tokio::test]
    async fn failed_dead_letter_write_leaves_event_unacked() {
        let store = InMemoryOrderStore::new();
        let sink = RecordingDeadLetterSink::new();
        sink.set_failing(true);
        let pipeline = pipeline(&store, RejectPolicy::DeadLetter(Arc::new(sink.clone())));
        let (event, rx) = event(b"garbage".to_vec());

        let state = pipeline.process(event).await;

        assert!(matches!(
            state,
            IngestState::Rejected {
                disposition: Disposition::Unacknowledged,
                ..
            }
        ));
        assert!(rx.await.is_err());
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_leaves_no_trace_and_no_ack() {
        let store = InMemoryOrderStore::new();
        store.fail_next_persist(WriteStage::Items);
        let sink = RecordingDeadLetterSink::new();
        let pipeline = pipeline(&store, RejectPolicy::DeadLetter(Arc::new(sink.clone())));
        let (event, rx) = event(sample_payload("test2"));

        let state = pipeline.process(event).await;

        let IngestState::Failed { order_uid, error } = state else {
            panic!("expected Failed, got {:?}", state.kind());
        };
        assert_eq!(order_uid, "test2");
        assert_eq!(error.kind(), "persistence");
        assert!(rx.await.is_err());
        assert!(!store.contains("test2"));
        assert!(!pipeline.cache().contains("test2").await);
        // Persistence failures are retried by redelivery, never dead-lettered
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn duplicate_is_acknowledged_and_repairs_cache() {
        let store = InMemoryOrderStore::with_orders([sample_order("test2")]);
        let pipeline = pipeline(&store, RejectPolicy::LeaveUnacknowledged);
        let (event, rx) = event(sample_payload("test2"));

        let state = pipeline.process(event).await;

        assert!(matches!(
            state,
            IngestState::Acknowledged {
                outcome: PersistOutcome::AlreadyPresent,
                ack_error: None,
                ..
            }
        ));
        assert!(rx.await.is_ok());
        assert_eq!(store.insert_count(), 0);
        assert!(pipeline.cache().contains("test2").await);
    }

    #[tokio::test]
    async fn changed_redelivery_caches_the_committed_order() {
        let stored = sample_order("test2");
        let store = InMemoryOrderStore::with_orders([stored.clone()]);
        let pipeline = pipeline(&store, RejectPolicy::LeaveUnacknowledged);

        let mut changed = stored.clone();
        changed.payment.amount = 999_999;
        changed.delivery.city = "Elsewhere".to_string();
        let (event, rx) = event(encode(&changed));

        let state = pipeline.process(event).await;

        assert_eq!(state.kind(), StateKind::Acknowledged);
        assert!(rx.await.is_ok());
        let cached = pipeline.cache().get("test2").await.unwrap();
        assert_eq!(*cached, stored);
        assert_eq!(store.get("test2"), Some(stored));
    }

    #[tokio::test]
    async fn ack_failure_does_not_fail_the_event() {
        let store = InMemoryOrderStore::new();
        let pipeline = pipeline(&store, RejectPolicy::LeaveUnacknowledged);
        let (event, rx) = event(sample_payload("test2"));
        drop(rx);

        let state = pipeline.process(event).await;

        assert!(matches!(
            state,
            IngestState::Acknowledged {
                ack_error: Some(SourceError::AckFailed(_)),
                ..
            }
        ));
        assert!(store.contains("test2"));
        assert!(pipeline.cache().contains("test2").await);
    }

    #[tokio::test]
    async fn terminal_states_do_not_advance() {
        let store = InMemoryOrderStore::new();
        let pipeline = pipeline(&store, RejectPolicy::LeaveUnacknowledged);
        let state = IngestState::Failed {
            order_uid: "x".to_string(),
            error: IngestError::from(order_cache_core::StoreError::Connection("down".to_string())),
        };

        let state = pipeline.advance(state).await;
        assert_eq!(state.kind(), StateKind::Failed);
    }
}
