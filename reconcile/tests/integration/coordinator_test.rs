use std::time::Duration;

use config::shared::WriteBatchConfig;
use reconcile::concurrency::BatchWriteCoordinator;
use reconcile::error::ErrorKind;
use reconcile::store::memory::MemoryStore;
use reconcile::store::{Mutation, SetOptions, WriteBatch, WriteOperation};
use reconcile::test_utils::records::document;
use reconcile::test_utils::store::{FaultType, FaultyStore};
use reconcile::types::DocumentKey;
use serde_json::json;
use telemetry::tracing::init_test_tracing;

fn set_operation(id: &str) -> WriteOperation {
    let key = DocumentKey::new("cards", id);
    let fields = document(json!({ "id": id }));

    Box::new(move |batch: &mut WriteBatch| {
        batch.set(key, fields, SetOptions::default());
    })
}

fn batch_ids(batch: &WriteBatch) -> Vec<String> {
    batch
        .mutations()
        .iter()
        .map(|mutation| match mutation {
            Mutation::Set { key, .. } | Mutation::Update { key, .. } => key.id.clone(),
        })
        .collect()
}

fn batch_config() -> WriteBatchConfig {
    WriteBatchConfig {
        max_batch_size: 3,
        pool_size: 1,
        max_concurrent_commits: 2,
        min_concurrent_commits: 1,
        flush_fan_out: 5,
        flush_chunk_pause_ms: 0,
        commit_timeout_ms: 30_000,
        max_retries: 3,
        base_retry_delay_ms: 1_000,
    }
}

#[tokio::test]
async fn seven_operations_are_committed_as_three_bounded_batches() {
    init_test_tracing();
    let store = MemoryStore::new();
    let mut coordinator = BatchWriteCoordinator::new(store.clone(), batch_config());

    for index in 0..7 {
        coordinator
            .submit(set_operation(&format!("card-{index}")))
            .await
            .unwrap();
    }
    let report = coordinator.flush().await.unwrap();

    let mut sizes: Vec<usize> = store
        .committed_batches()
        .await
        .iter()
        .map(WriteBatch::len)
        .collect();
    sizes.sort_unstable();

    assert_eq!(sizes, vec![1, 3, 3]);
    assert_eq!(report.batches_committed, 3);
    assert_eq!(report.operations_committed, 7);
    assert_eq!(store.documents("cards").await.len(), 7);
    assert_eq!(coordinator.pending_operations(), 0);
}

#[tokio::test]
async fn the_unit_filled_first_is_committed_first() {
    init_test_tracing();
    let store = MemoryStore::new();
    let config = WriteBatchConfig {
        max_batch_size: 2,
        pool_size: 2,
        max_concurrent_commits: 1,
        ..batch_config()
    };
    let mut coordinator = BatchWriteCoordinator::new(store.clone(), config);

    for id in ["a", "b", "c", "d", "e", "f", "g"] {
        coordinator.submit(set_operation(id)).await.unwrap();
    }
    coordinator.flush().await.unwrap();

    let batches: Vec<Vec<String>> = store.committed_batches().await.iter().map(batch_ids).collect();
    assert_eq!(
        batches,
        vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["c".to_string(), "d".to_string()],
            vec!["e".to_string(), "f".to_string()],
            vec!["g".to_string()],
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn flush_pauses_between_chunks() {
    init_test_tracing();
    let store = FaultyStore::wrap(MemoryStore::new()).with_commit_latency(Duration::from_millis(100));
    let config = WriteBatchConfig {
        max_batch_size: 1,
        pool_size: 4,
        max_concurrent_commits: 2,
        flush_fan_out: 2,
        flush_chunk_pause_ms: 500,
        ..batch_config()
    };
    let mut coordinator = BatchWriteCoordinator::new(store.clone(), config);

    for index in 0..4 {
        coordinator
            .submit(set_operation(&format!("card-{index}")))
            .await
            .unwrap();
    }
    let started = tokio::time::Instant::now();
    let report = coordinator.flush().await.unwrap();
    let elapsed = started.elapsed();

    // Two chunks of two commits, 100 ms each, with one pause in between.
    assert!(elapsed >= Duration::from_millis(700), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(800), "{elapsed:?}");
    assert_eq!(report.batches_committed, 4);
    assert_eq!(store.max_concurrent_commits(), 2);
}

#[tokio::test(start_paused = true)]
async fn commits_never_exceed_the_concurrency_ceiling() {
    init_test_tracing();
    let store = FaultyStore::wrap(MemoryStore::new()).with_commit_latency(Duration::from_millis(100));
    let config = WriteBatchConfig {
        max_batch_size: 1,
        ..batch_config()
    };
    let mut coordinator = BatchWriteCoordinator::new(store.clone(), config);

    for index in 0..5 {
        coordinator
            .submit(set_operation(&format!("card-{index}")))
            .await
            .unwrap();
        assert!(coordinator.in_flight() <= 2);
    }
    let report = coordinator.flush().await.unwrap();

    assert!(store.max_concurrent_commits() <= 2);
    assert_eq!(report.batches_committed, 5);
    assert_eq!(store.get_inner().documents("cards").await.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_after_exponential_backoff() {
    init_test_tracing();
    let store = FaultyStore::wrap(MemoryStore::new());
    store
        .fail_next_commits([FaultType::Unavailable, FaultType::Unavailable])
        .await;
    let mut coordinator = BatchWriteCoordinator::new(store.clone(), batch_config());

    let started = tokio::time::Instant::now();
    coordinator.submit(set_operation("card-1")).await.unwrap();
    let report = coordinator.flush().await.unwrap();
    let elapsed = started.elapsed();

    // Two backoff delays: 1000 ms then 2000 ms.
    assert!(elapsed >= Duration::from_millis(3_000), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(4_000), "{elapsed:?}");
    assert_eq!(store.commit_attempts(), 3);
    assert_eq!(report.commit_attempts, 3);
    assert_eq!(store.get_inner().committed_batches().await.len(), 1);
}

#[tokio::test]
async fn deadline_failures_halve_the_ceiling_and_commit_the_rest() {
    init_test_tracing();
    let store = FaultyStore::wrap(MemoryStore::new());
    store.fail_next_commits([FaultType::DeadlineExceeded]).await;
    let config = WriteBatchConfig {
        max_batch_size: 1,
        pool_size: 4,
        max_concurrent_commits: 4,
        flush_fan_out: 4,
        max_retries: 0,
        ..batch_config()
    };
    let mut coordinator = BatchWriteCoordinator::new(store.clone(), config);

    for index in 0..4 {
        coordinator
            .submit(set_operation(&format!("card-{index}")))
            .await
            .unwrap();
    }
    let report = coordinator.flush().await.unwrap();

    assert_eq!(report.throttle_events, 1);
    assert_eq!(report.concurrency_limit, 2);
    assert_eq!(report.batches_committed, 4);
    assert_eq!(store.commit_attempts(), 5);
    assert_eq!(coordinator.concurrency_limit(), 2);
    assert_eq!(store.get_inner().documents("cards").await.len(), 4);
}

#[tokio::test]
async fn deadline_failures_at_the_floor_are_returned_and_keep_the_unit() {
    init_test_tracing();
    let store = FaultyStore::wrap(MemoryStore::new());
    store
        .fail_next_commits([FaultType::DeadlineExceeded, FaultType::DeadlineExceeded])
        .await;
    let config = WriteBatchConfig {
        max_retries: 0,
        ..batch_config()
    };
    let mut coordinator = BatchWriteCoordinator::new(store.clone(), config);

    coordinator.submit(set_operation("card-1")).await.unwrap();
    let err = coordinator.flush().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StoreDeadlineExceeded);
    assert_eq!(coordinator.concurrency_limit(), 1);
    assert_eq!(coordinator.pending_operations(), 1);
    assert!(store.get_inner().documents("cards").await.is_empty());

    // The script is exhausted, so the kept unit commits on the next flush.
    coordinator.flush().await.unwrap();
    assert_eq!(store.get_inner().documents("cards").await.len(), 1);
}

#[tokio::test]
async fn fatal_failures_abort_the_flush_without_retry() {
    init_test_tracing();
    let store = FaultyStore::wrap(MemoryStore::new());
    store.fail_next_commits([FaultType::Fatal]).await;
    let mut coordinator = BatchWriteCoordinator::new(store.clone(), batch_config());

    coordinator.submit(set_operation("card-1")).await.unwrap();
    let err = coordinator.flush().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StoreCommitFailed);
    assert_eq!(store.commit_attempts(), 1);
    assert!(store.get_inner().committed_batches().await.is_empty());
}

#[tokio::test]
async fn fatal_background_failures_surface_from_submit() {
    init_test_tracing();
    let store = FaultyStore::wrap(MemoryStore::new());
    store.fail_next_commits([FaultType::Fatal]).await;
    let config = WriteBatchConfig {
        max_batch_size: 1,
        max_concurrent_commits: 1,
        ..batch_config()
    };
    let mut coordinator = BatchWriteCoordinator::new(store.clone(), config);

    coordinator.submit(set_operation("card-1")).await.unwrap();
    coordinator.submit(set_operation("card-2")).await.unwrap();
    let err = coordinator.submit(set_operation("card-3")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StoreCommitFailed);
    // The failed unit is back in the pool next to the one holding `card-2`.
    assert_eq!(coordinator.pending_operations(), 2);
}
