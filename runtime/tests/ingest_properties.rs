//! End-to-end behavior of source → pipeline → store → cache → lookup,
//! using the in-memory collaborators.

#![allow(clippy::unwrap_used, clippy::panic)] // Test code can use unwrap and panic

use futures::StreamExt;
use order_cache_core::{EventSource, Order, PersistOutcome};
use order_cache_runtime::{
    IngestPipeline, IngestState, LookupError, LookupService, ReadCache, RejectPolicy, StateKind,
    warm_cache,
};
use order_cache_testing::fixtures::{encode, sample_order, sample_order_with_items};
use order_cache_testing::properties::order_strategy_for;
use order_cache_testing::{InMemoryEventSource, InMemoryOrderStore, init_test_tracing};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

const CHANNEL: &str = "orders";

fn pipeline_over(store: &InMemoryOrderStore, cache: &ReadCache) -> IngestPipeline {
    IngestPipeline::new(
        Arc::new(store.clone()),
        cache.clone(),
        RejectPolicy::LeaveUnacknowledged,
    )
}

/// Drain every currently deliverable event through the pipeline.
async fn drain(source: &InMemoryEventSource, pipeline: &IngestPipeline) -> Vec<StateKind> {
    let mut stream = source.subscribe(CHANNEL).await.unwrap();
    let mut reached = Vec::new();
    while let Some(event) = stream.next().await {
        reached.push(pipeline.process(event.unwrap()).await.kind());
    }
    reached
}

#[tokio::test]
async fn redelivered_event_is_written_once_and_acked_twice() {
    init_test_tracing();
    let source = InMemoryEventSource::new();
    let store = InMemoryOrderStore::new();
    let cache = ReadCache::new();
    let pipeline = pipeline_over(&store, &cache);

    let order = sample_order_with_items("test2", 2);
    source.publish_order(CHANNEL, &order);
    source.publish_order(CHANNEL, &order);
    source.close();

    let reached = drain(&source, &pipeline).await;

    assert_eq!(reached, vec![StateKind::Acknowledged, StateKind::Acknowledged]);
    assert_eq!(store.insert_count(), 1);
    assert_eq!(store.persist_calls(), 2);
    assert_eq!(source.acked(CHANNEL), vec![1, 2]);
    assert_eq!(*cache.get("test2").await.unwrap(), order);
}

#[tokio::test]
async fn crash_before_ack_then_redelivery_matches_clean_run() {
    init_test_tracing();
    let order = sample_order_with_items("test2", 2);

    // Clean single run
    let clean_store = InMemoryOrderStore::new();
    let clean_cache = ReadCache::new();
    {
        let source = InMemoryEventSource::new();
        source.publish_order(CHANNEL, &order);
        source.close();
        drain(&source, &pipeline_over(&clean_store, &clean_cache)).await;
    }

    // Crash after commit, before cache promotion and ack
    let source = InMemoryEventSource::new();
    source.publish_order(CHANNEL, &order);
    source.close();
    let store = InMemoryOrderStore::new();
    {
        let doomed_cache = ReadCache::new();
        let pipeline = pipeline_over(&store, &doomed_cache);
        let mut stream = source.subscribe(CHANNEL).await.unwrap();
        let mut state = IngestState::Received(stream.next().await.unwrap().unwrap());
        while state.kind() != StateKind::Persisted {
            state = pipeline.advance(state).await;
        }
        drop(state);
    }
    assert!(store.contains("test2"));
    assert!(source.acked(CHANNEL).is_empty());

    // Restart: warm a fresh cache, then consume the redelivery
    let cache = ReadCache::new();
    warm_cache(&store, &cache).await.unwrap();
    let pipeline = pipeline_over(&store, &cache);
    let mut stream = source.subscribe(CHANNEL).await.unwrap();
    let state = pipeline.process(stream.next().await.unwrap().unwrap()).await;

    assert!(matches!(
        state,
        IngestState::Acknowledged {
            outcome: PersistOutcome::AlreadyPresent,
            ..
        }
    ));
    assert!(stream.next().await.is_none());
    assert_eq!(source.acked(CHANNEL), vec![1]);
    assert_eq!(source.deliveries(CHANNEL, 1), 2);
    assert_eq!(store.insert_count(), 1);
    assert_eq!(store.get("test2"), clean_store.get("test2"));
    assert_eq!(cache.get("test2").await, clean_cache.get("test2").await);
}

#[tokio::test]
async fn invalid_events_stay_out_of_store_and_cache() {
    init_test_tracing();
    let source = InMemoryEventSource::new();
    let store = InMemoryOrderStore::new();
    let cache = ReadCache::new();
    let pipeline = pipeline_over(&store, &cache);

    let mut empty_uid = sample_order("ignored");
    empty_uid.order_uid = String::new();
    let mut no_items = sample_order("no-items");
    no_items.items.clear();

    source.publish(CHANNEL, encode(&empty_uid));
    source.publish(CHANNEL, encode(&no_items));
    source.publish(CHANNEL, b"not json at all".to_vec());
    source.publish_order(CHANNEL, &sample_order("good"));
    source.close();

    let reached = drain(&source, &pipeline).await;

    assert_eq!(
        reached,
        vec![
            StateKind::Rejected,
            StateKind::Rejected,
            StateKind::Rejected,
            StateKind::Acknowledged,
        ]
    );
    assert_eq!(store.len(), 1);
    assert_eq!(cache.len().await, 1);
    assert!(!cache.contains("no-items").await);
    assert_eq!(source.acked(CHANNEL), vec![4]);
    assert_eq!(source.pending(CHANNEL), 3);
}

#[tokio::test]
async fn unacknowledged_event_does_not_stall_later_orders() {
    init_test_tracing();
    let source = InMemoryEventSource::new().with_redelivery_delay(Duration::from_millis(5));
    let store = InMemoryOrderStore::new();
    let cache = ReadCache::new();
    let pipeline = pipeline_over(&store, &cache);

    source.publish(CHANNEL, b"{not json".to_vec());
    source.publish_order(CHANNEL, &sample_order("after-1"));
    source.publish_order(CHANNEL, &sample_order("after-2"));

    let mut stream = source.subscribe(CHANNEL).await.unwrap();
    let mut reached = Vec::new();
    // Poison, both orders, then the poison twice more
    for _ in 0..5 {
        let event = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        reached.push((event.info.sequence, pipeline.process(event).await.kind()));
    }

    assert_eq!(
        reached,
        vec![
            (1, StateKind::Rejected),
            (2, StateKind::Acknowledged),
            (3, StateKind::Acknowledged),
            (1, StateKind::Rejected),
            (1, StateKind::Rejected),
        ]
    );
    assert!(cache.contains("after-1").await);
    assert!(cache.contains("after-2").await);
    assert_eq!(source.acked(CHANNEL), vec![2, 3]);
    assert_eq!(source.pending(CHANNEL), 1);
    assert_eq!(source.deliveries(CHANNEL, 1), 3);
}

#[tokio::test]
async fn lookup_after_ingest_returns_the_published_order() {
    let source = InMemoryEventSource::new();
    let store = InMemoryOrderStore::new();
    let cache = ReadCache::new();
    let pipeline = pipeline_over(&store, &cache);
    let lookup = LookupService::new(cache.clone());

    let order = sample_order_with_items("test2", 2);
    source.publish_order(CHANNEL, &order);
    source.close();
    drain(&source, &pipeline).await;

    let found = lookup.lookup(Some("test2")).await.unwrap();
    assert_eq!(found.order_uid, "test2");
    assert_eq!(found.items.len(), 2);
    assert_eq!(
        lookup.lookup(Some("does-not-exist")).await,
        Err(LookupError::NotFound("does-not-exist".to_string()))
    );
    assert_eq!(lookup.lookup(Some("")).await, Err(LookupError::BadRequest));
}

fn batch_strategy() -> impl Strategy<Value = Vec<(Order, usize)>> {
    // Each distinct order is published one to three times
    (1usize..8).prop_flat_map(|count| {
        (0..count)
            .map(|n| (order_strategy_for(format!("order-{n}"), 3), 1usize..=3))
            .collect::<Vec<_>>()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn store_and_caches_agree_after_redeliveries(batch in batch_strategy()) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let source = InMemoryEventSource::new();
            let store = InMemoryOrderStore::new();
            let live_cache = ReadCache::new();
            let pipeline = pipeline_over(&store, &live_cache);

            for round in 0..3 {
                for (order, copies) in &batch {
                    if round < *copies {
                        source.publish_order(CHANNEL, order);
                    }
                }
            }
            source.close();
            drain(&source, &pipeline).await;

            let warmed = ReadCache::new();
            warm_cache(&store, &warmed).await.unwrap();
            let lookup = LookupService::new(warmed);

            assert_eq!(store.insert_count(), batch.len());
            for (order, _) in &batch {
                let stored = store.get(&order.order_uid).unwrap();
                assert_eq!(&stored, order);
                assert_eq!(*lookup.lookup(Some(&order.order_uid)).await.unwrap(), stored);
                assert_eq!(*live_cache.get(&order.order_uid).await.unwrap(), stored);
            }
            assert_eq!(
                lookup.lookup(Some("never-persisted")).await,
                Err(LookupError::NotFound("never-persisted".to_string()))
            );
            assert_eq!(source.pending(CHANNEL), 0);
        });
    }
}
