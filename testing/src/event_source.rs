//! In-memory durable event source.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on a poisoned lock

use order_cache_core::{
    Acknowledgement, BoxFuture, DeliveryInfo, EventSource, EventStream, InboundEvent, Order,
    SourceError,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug)]
struct Entry {
    payload: Vec<u8>,
    acked: bool,
    deliveries: u32,
}

#[derive(Debug, Default)]
struct Log {
    channels: HashMap<String, Vec<Entry>>,
    closed: bool,
    failing_subscribes: usize,
}

impl Log {
    /// Next unacked entry at or after `cursor`, marked as delivered.
    fn next_pending(&mut self, channel: &str, cursor: usize) -> Option<(usize, Vec<u8>)> {
        let entries = self.channels.get_mut(channel)?;
        let (index, entry) = entries
            .iter_mut()
            .enumerate()
            .skip(cursor)
            .find(|(_, entry)| !entry.acked)?;
        entry.deliveries += 1;
        Some((index, entry.payload.clone()))
    }

    /// The entry at `index` again, unless it was acked in the meantime.
    fn redeliver(&mut self, channel: &str, index: usize) -> Option<(usize, Vec<u8>)> {
        let entry = self.channels.get_mut(channel)?.get_mut(index)?;
        if entry.acked {
            return None;
        }
        entry.deliveries += 1;
        Some((index, entry.payload.clone()))
    }

    fn mark_acked(&mut self, channel: &str, index: usize) {
        if let Some(entry) = self
            .channels
            .get_mut(channel)
            .and_then(|entries| entries.get_mut(index))
        {
            entry.acked = true;
        }
    }
}

fn sequence_of(index: usize) -> i64 {
    i64::try_from(index).map_or(i64::MAX, |i| i + 1)
}

/// In-memory [`EventSource`] with durable subscription semantics.
///
/// - Events are kept per channel in publish order and numbered from 1
/// - A subscription delivers every unacked event, then waits for new ones
/// - An event dropped without ack never holds back later events. By default it
///   is redelivered on the next `subscribe`; with
///   [`with_redelivery_delay`](Self::with_redelivery_delay) the same
///   subscription delivers it again once the delay has passed
/// - After [`close`](Self::close), a subscription ends once it has nothing
///   left to deliver, including scheduled redeliveries
///
/// # Example
///
/// ```
/// use futures::StreamExt;
/// use order_cache_core::EventSource;
/// use order_cache_testing::InMemoryEventSource;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let source = InMemoryEventSource::new();
/// source.publish("orders", b"{}".to_vec());
/// source.close();
///
/// let mut stream = source.subscribe("orders").await?;
/// let event = stream.next().await.unwrap()?;
/// event.ack.ack()?;
/// assert!(stream.next().await.is_none());
/// assert_eq!(source.acked("orders"), vec![1]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryEventSource {
    log: Arc<Mutex<Log>>,
    changes: Arc<watch::Sender<u64>>,
    redelivery_delay: Option<Duration>,
}

impl InMemoryEventSource {
    /// Create an empty source
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            log: Arc::new(Mutex::new(Log::default())),
            changes: Arc::new(changes),
            redelivery_delay: None,
        }
    }

    /// Redeliver dropped events within a subscription after `delay`.
    #[must_use]
    pub const fn with_redelivery_delay(mut self, delay: Duration) -> Self {
        self.redelivery_delay = Some(delay);
        self
    }

    /// Append a payload to a channel and return its sequence number.
    pub fn publish(&self, channel: &str, payload: Vec<u8>) -> i64 {
        let index = {
            let mut log = self.log.lock().unwrap();
            let entries = log.channels.entry(channel.to_string()).or_default();
            entries.push(Entry {
                payload,
                acked: false,
                deliveries: 0,
            });
            entries.len() - 1
        };
        self.changes.send_modify(|version| *version += 1);
        sequence_of(index)
    }

    /// Append an order encoded as JSON.
    pub fn publish_order(&self, channel: &str, order: &Order) -> i64 {
        self.publish(channel, serde_json::to_vec(order).unwrap())
    }

    /// Stop waiting for new events; open subscriptions end once drained.
    pub fn close(&self) {
        self.log.lock().unwrap().closed = true;
        self.changes.send_modify(|version| *version += 1);
    }

    /// Make the next `count` calls to `subscribe` fail.
    pub fn fail_next_subscribes(&self, count: usize) {
        self.log.lock().unwrap().failing_subscribes = count;
    }

    /// Sequence numbers of acknowledged events, in publish order
    #[must_use]
    pub fn acked(&self, channel: &str) -> Vec<i64> {
        self.log
            .lock()
            .unwrap()
            .channels
            .get(channel)
            .map(|entries| {
                entries
                    .iter()
                    .enumerate()
                    .filter(|(_, entry)| entry.acked)
                    .map(|(index, _)| sequence_of(index))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of events not yet acknowledged
    #[must_use]
    pub fn pending(&self, channel: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .channels
            .get(channel)
            .map_or(0, |entries| entries.iter().filter(|e| !e.acked).count())
    }

    /// How many times the event with `sequence` has been delivered
    #[must_use]
    pub fn deliveries(&self, channel: &str, sequence: i64) -> u32 {
        let Ok(index) = usize::try_from(sequence - 1) else {
            return 0;
        };
        self.log
            .lock()
            .unwrap()
            .channels
            .get(channel)
            .and_then(|entries| entries.get(index))
            .map_or(0, |entry| entry.deliveries)
    }
}

impl Default for InMemoryEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for InMemoryEventSource {
    fn subscribe<'a>(&'a self, channel: &'a str) -> BoxFuture<'a, Result<EventStream, SourceError>> {
        Box::pin(async move {
            {
                let mut log = self.log.lock().unwrap();
                if log.failing_subscribes > 0 {
                    log.failing_subscribes -= 1;
                    return Err(SourceError::SubscriptionFailed {
                        channel: channel.to_string(),
                        reason: "injected subscribe failure".to_string(),
                    });
                }
            }

            let log = Arc::clone(&self.log);
            let mut changes = self.changes.subscribe();
            let channel = channel.to_string();

            let redelivery_delay = self.redelivery_delay;

            let stream = async_stream::stream! {
                let mut cursor = 0;
                let mut retries: VecDeque<(usize, Instant)> = VecDeque::new();
                loop {
                    let retry = match retries.front() {
                        Some(&(_, due)) if due <= Instant::now() => {
                            retries.pop_front().map(|(index, _)| index)
                        }
                        _ => None,
                    };
                    let (next, closed) = {
                        let mut guard = log.lock().unwrap();
                        let next = match retry {
                            Some(index) => guard.redeliver(&channel, index),
                            None => guard.next_pending(&channel, cursor),
                        };
                        (next, guard.closed)
                    };

                    match next {
                        Some((index, payload)) => {
                            if retry.is_none() {
                                cursor = index + 1;
                            }
                            let (ack, outcome) = Acknowledgement::channel();
                            let info = DeliveryInfo {
                                channel: channel.clone(),
                                partition: 0,
                                sequence: sequence_of(index),
                            };
                            yield Ok(InboundEvent::new(payload, info, ack));

                            if outcome.await.is_ok() {
                                log.lock().unwrap().mark_acked(&channel, index);
                            } else if let Some(delay) = redelivery_delay {
                                retries.push_back((index, Instant::now() + delay));
                            }
                        }
                        // Acked through another subscription meanwhile
                        None if retry.is_some() => {}
                        None => match retries.front().map(|&(_, due)| due) {
                            Some(due) => {
                                tokio::select! {
                                    () = tokio::time::sleep_until(due) => {}
                                    changed = changes.changed() => {
                                        if changed.is_err() {
                                            break;
                                        }
                                    }
                                }
                            }
                            None if closed => break,
                            None => {
                                if changes.changed().await.is_err() {
                                    break;
                                }
                            }
                        },
                    }
                }
            };

            Ok(Box::pin(stream) as EventStream)
        })
    }
}
