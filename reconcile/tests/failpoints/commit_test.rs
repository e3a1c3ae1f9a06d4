use config::shared::{ImageConfig, ReconcilerConfig, WriteBatchConfig};
use fail::FailScenario;
use reconcile::catalog::MemoryCatalog;
use reconcile::concurrency::BatchWriteCoordinator;
use reconcile::error::ErrorKind;
use reconcile::failpoints::{COMMIT_UNIT_BEFORE_COMMIT, RECONCILER_BEFORE_FLUSH};
use reconcile::reconciler::Reconciler;
use reconcile::store::memory::MemoryStore;
use reconcile::store::{SetOptions, WriteBatch};
use reconcile::test_utils::images::RecordingImages;
use reconcile::test_utils::records::{canonical, document, local, seed_records};
use reconcile::types::{CanonicalRecord, DocumentKey};
use serde_json::json;
use telemetry::tracing::init_test_tracing;

#[tokio::test(start_paused = true)]
async fn unavailable_commit_is_retried_once() {
    init_test_tracing();
    let scenario = FailScenario::setup();
    fail::cfg(COMMIT_UNIT_BEFORE_COMMIT, "1*return(unavailable)").unwrap();

    let store = MemoryStore::new();
    let mut coordinator = BatchWriteCoordinator::new(store.clone(), WriteBatchConfig::default());
    let key = DocumentKey::new("cards", "card-1");
    let fields = document(json!({"name": "Cloud"}));
    coordinator
        .submit(Box::new(move |batch: &mut WriteBatch| {
            batch.set(key, fields, SetOptions::default());
        }))
        .await
        .unwrap();

    let report = coordinator.flush().await.unwrap();

    assert_eq!(report.commit_attempts, 2);
    assert_eq!(store.committed_batches().await.len(), 1);
    assert_eq!(store.documents("cards").await.len(), 1);

    scenario.teardown();
}

#[tokio::test]
async fn failure_before_the_final_flush_leaves_the_store_untouched() {
    init_test_tracing();
    let scenario = FailScenario::setup();
    fail::cfg(RECONCILER_BEFORE_FLUSH, "1*return").unwrap();

    let store = MemoryStore::new();
    seed_records(
        &store,
        "cards",
        vec![local("card-1", json!({"code": "1-001H", "power": null}))],
    )
    .await;
    let catalog = MemoryCatalog::new(vec![CanonicalRecord {
        power: Some("7000".to_string()),
        ..canonical("1-001H")
    }]);
    let reconciler = Reconciler::new(
        store.clone(),
        catalog,
        RecordingImages::new(),
        ReconcilerConfig::default(),
        WriteBatchConfig::default(),
        ImageConfig::default(),
    )
    .unwrap();

    let err = reconciler.run().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreCommitFailed);
    assert!(store.committed_batches().await.is_empty());

    let summary = reconciler.run().await.unwrap();
    assert_eq!(summary.updated, 1);
    assert_eq!(
        store.documents("cards").await["card-1"]["power"],
        json!(7000)
    );

    scenario.teardown();
}
