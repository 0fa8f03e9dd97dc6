//! Subscribe-process-reconnect loop feeding the ingest pipeline.
//!
//! ```text
//! loop {
//!     subscribe(channel)
//!         ok  → process events one at a time until the stream ends
//!         err → log
//!     wait retry_delay, then subscribe again
//! }
//! ```
//!
//! Events are processed strictly one after another: the next event is not
//! pulled until the previous one reached a terminal state. A shutdown signal
//! is only observed between events, so an in-flight event always finishes
//! its commit, cache promotion and acknowledgement.

use crate::pipeline::IngestPipeline;
use futures::StreamExt;
use order_cache_core::{EventSource, EventStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Default wait before resubscribing after a failure or a closed stream.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Why [`IngestConsumer::process_stream`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The source closed the stream
    Exhausted,
    /// A shutdown signal was received
    Shutdown,
}

/// Long-running consumer of one channel.
///
/// `IngestConsumer` is `Send` so it can be moved into a tokio task via
/// [`spawn`](Self::spawn). It runs until the shutdown sender fires or is
/// dropped.
pub struct IngestConsumer {
    /// Consumer name (for logging)
    name: String,

    /// Channel to subscribe to
    channel: String,

    /// Where events come from
    source: Arc<dyn EventSource>,

    /// What each event goes through
    pipeline: Arc<IngestPipeline>,

    /// Shutdown signal receiver
    shutdown: broadcast::Receiver<()>,

    /// Wait before resubscribing
    retry_delay: Duration,
}

impl IngestConsumer {
    /// Create a consumer for `channel` with the default retry delay.
    ///
    /// The consumer is named after the channel until
    /// [`with_name`](Self::with_name) is called.
    #[must_use]
    pub fn new(
        channel: impl Into<String>,
        source: Arc<dyn EventSource>,
        pipeline: Arc<IngestPipeline>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let channel = channel.into();
        Self {
            name: channel.clone(),
            channel,
            source,
            pipeline,
            shutdown,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Set the name used in logs.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set custom retry delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Spawn the consumer as a background task.
    ///
    /// The returned handle completes once the shutdown signal is observed.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run until shutdown.
    ///
    /// Subscribe failures and closed streams are logged and retried after
    /// the retry delay; neither stops the consumer.
    pub async fn run(&mut self) {
        info!(consumer = %self.name, channel = %self.channel, "Ingest consumer started");

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Ingest consumer received shutdown signal");
                    break;
                }
                subscribe_result = self.source.subscribe(&self.channel) => {
                    match subscribe_result {
                        Ok(mut stream) => {
                            info!(consumer = %self.name, channel = %self.channel, "Subscribed to event source");
                            if self.process_stream(&mut stream).await == StreamEnd::Shutdown {
                                break;
                            }
                            warn!(
                                consumer = %self.name,
                                "Event stream ended, resubscribing in {:?}",
                                self.retry_delay
                            );
                        }
                        Err(e) => {
                            error!(
                                consumer = %self.name,
                                error = %e,
                                "Failed to subscribe to event source, retrying in {:?}",
                                self.retry_delay
                            );
                        }
                    }
                }
            }

            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Ingest consumer received shutdown signal");
                    break;
                }
                () = tokio::time::sleep(self.retry_delay) => {}
            }
        }

        info!(consumer = %self.name, "Ingest consumer stopped");
    }

    /// Feed events from `stream` through the pipeline until the stream ends
    /// or shutdown is signalled.
    ///
    /// Transport errors on individual items are logged and skipped.
    pub async fn process_stream(&mut self, stream: &mut EventStream) -> StreamEnd {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Ingest consumer received shutdown signal during processing");
                    return StreamEnd::Shutdown;
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(event)) => {
                            self.pipeline.process(event).await;
                        }
                        Some(Err(e)) => {
                            error!(consumer = %self.name, error = %e, "Error receiving event from source");
                        }
                        None => return StreamEnd::Exhausted,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use crate::cache::ReadCache;
    use crate::pipeline::RejectPolicy;
    use order_cache_testing::fixtures::sample_order;
    use order_cache_testing::{InMemoryEventSource, InMemoryOrderStore};

    fn pipeline(store: &InMemoryOrderStore) -> Arc<IngestPipeline> {
        Arc::new(IngestPipeline::new(
            Arc::new(store.clone()),
            ReadCache::new(),
            RejectPolicy::LeaveUnacknowledged,
        ))
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn closed_stream_is_exhausted() {
        let source = InMemoryEventSource::new();
        source.publish_order("orders", &sample_order("a"));
        source.close();
        let store = InMemoryOrderStore::new();
        let (_tx, rx) = broadcast::channel(1);
        let mut consumer =
            IngestConsumer::new("orders", Arc::new(source.clone()), pipeline(&store), rx);

        let mut stream = source.subscribe("orders").await.unwrap();
        let end = consumer.process_stream(&mut stream).await;

        assert_eq!(end, StreamEnd::Exhausted);
        assert!(store.contains("a"));
        assert_eq!(source.acked("orders"), vec![1]);
    }

    #[tokio::test]
    async fn shutdown_stops_an_idle_stream() {
        let source = InMemoryEventSource::new();
        let store = InMemoryOrderStore::new();
        let (tx, rx) = broadcast::channel(1);
        let mut consumer =
            IngestConsumer::new("orders", Arc::new(source.clone()), pipeline(&store), rx);

        let mut stream = source.subscribe("orders").await.unwrap();
        tx.send(()).unwrap();
        let end = consumer.process_stream(&mut stream).await;

        assert_eq!(end, StreamEnd::Shutdown);
    }

    #[tokio::test]
    async fn resubscribes_after_subscribe_failures() {
        let source = InMemoryEventSource::new();
        source.fail_next_subscribes(2);
        source.publish_order("orders", &sample_order("a"));
        let store = InMemoryOrderStore::new();
        let (tx, rx) = broadcast::channel(1);

        let handle = IngestConsumer::new("orders", Arc::new(source.clone()), pipeline(&store), rx)
            .with_name("test-consumer")
            .with_retry_delay(Duration::from_millis(10))
            .spawn();

        wait_until(|| store.contains("a")).await;
        source.publish_order("orders", &sample_order("b"));
        wait_until(|| store.contains("b")).await;

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn unacked_event_is_retried_on_next_subscription() {
        let source = InMemoryEventSource::new();
        source.publish_order("orders", &sample_order("a"));
        source.close();
        let store = InMemoryOrderStore::new();
        store.set_unavailable(true);
        let (tx, rx) = broadcast::channel(1);

        let handle = IngestConsumer::new("orders", Arc::new(source.clone()), pipeline(&store), rx)
            .with_retry_delay(Duration::from_millis(10))
            .spawn();

        wait_until(|| source.deliveries("orders", 1) >= 2).await;
        assert!(source.acked("orders").is_empty());

        store.set_unavailable(false);
        wait_until(|| source.pending("orders") == 0).await;
        assert!(store.contains("a"));

        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_shutdown_sender_stops_consumer() {
        let source = InMemoryEventSource::new();
        let store = InMemoryOrderStore::new();
        let (tx, rx) = broadcast::channel::<()>(1);

        let handle = IngestConsumer::new("orders", Arc::new(source), pipeline(&store), rx).spawn();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
