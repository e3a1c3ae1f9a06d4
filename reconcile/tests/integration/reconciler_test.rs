use config::shared::{ImageConfig, ReconcilerConfig, WriteBatchConfig};
use insta::assert_json_snapshot;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use reconcile::catalog::{CatalogSource, MemoryCatalog};
use reconcile::error::ErrorKind;
use reconcile::fingerprint::fingerprint_key;
use reconcile::images::ImageProcessor;
use reconcile::reconciler::Reconciler;
use reconcile::store::memory::MemoryStore;
use reconcile::store::{DocumentStore, Mutation};
use reconcile::test_utils::catalog::FailingCatalog;
use reconcile::test_utils::images::RecordingImages;
use reconcile::test_utils::records::{canonical, local, seed_records};
use reconcile::test_utils::store::{FaultType, FaultyStore};
use reconcile::types::{CanonicalRecord, Document, DocumentKey};
use serde_json::json;
use telemetry::tracing::init_test_tracing;

const CARDS: &str = "cards";
const FINGERPRINTS: &str = "sync_fingerprints";
const SEARCH_INDEX: &str = "search_index";

fn cloud() -> CanonicalRecord {
    CanonicalRecord {
        power: Some("7000".to_string()),
        rarity: Some("C".to_string()),
        ..canonical("1-001H")
    }
}

fn cloud_local() -> serde_json::Value {
    json!({
        "codes": ["1-001H"],
        "power": null,
        "rarity": null,
    })
}

fn reconciler<S, C, I>(store: S, catalog: C, images: I, config: ReconcilerConfig) -> Reconciler<S, C, I>
where
    S: DocumentStore + Clone + Send + Sync + 'static,
    C: CatalogSource,
    I: ImageProcessor + Sync,
{
    Reconciler::new(
        store,
        catalog,
        images,
        config,
        WriteBatchConfig::default(),
        ImageConfig::default(),
    )
    .unwrap()
}

async fn card(store: &MemoryStore, id: &str) -> Document {
    store.document(&DocumentKey::new(CARDS, id)).await.unwrap()
}

#[tokio::test]
async fn missing_fields_are_filled_and_a_second_run_writes_nothing() {
    init_test_tracing();
    let store = MemoryStore::new();
    seed_records(&store, CARDS, vec![local("card-1", cloud_local())]).await;
    let reconciler = reconciler(
        store.clone(),
        MemoryCatalog::new(vec![cloud()]),
        RecordingImages::new(),
        ReconcilerConfig::default(),
    );

    let summary = reconciler.run().await.unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.matched, 1);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.index_updates, 1);
    assert_eq!(summary.batches_committed, 2);

    let batches = store.committed_batches().await;
    let update = batches
        .iter()
        .flat_map(|batch| batch.mutations())
        .find_map(|mutation| match mutation {
            Mutation::Update { key, fields } if key.collection == CARDS => Some(fields.clone()),
            _ => None,
        })
        .unwrap();
    assert_json_snapshot!(update, { ".last_updated" => "[last_updated]" }, @r#"
    {
      "last_updated": "[last_updated]",
      "power": 7000,
      "rarity": "Common"
    }
    "#);

    let stored = card(&store, "card-1").await;
    assert_eq!(stored["power"], json!(7000));
    assert_eq!(stored["rarity"], json!("Common"));
    assert!(stored.get("code").is_none());
    assert!(stored.get("primary_code").is_none());
    let fingerprint = store
        .document(&DocumentKey::new(FINGERPRINTS, fingerprint_key("1-001H")))
        .await
        .unwrap();
    assert_eq!(fingerprint["record_ids"], json!(["card-1"]));

    let second = reconciler.run().await.unwrap();

    assert_eq!(second.skipped_unchanged, 1);
    assert_eq!(second.updated, 0);
    assert_eq!(second.index_updates, 0);
    assert_eq!(second.batches_committed, 0);
    assert_eq!(store.committed_batches().await.len(), 2);
}

#[tokio::test]
async fn non_entity_records_only_lose_their_identifiers() {
    init_test_tracing();
    let store = MemoryStore::new();
    seed_records(
        &store,
        CARDS,
        vec![local(
            "rules-1",
            json!({
                "non_entity": true,
                "name": "Rules insert",
                "code": "1-001H",
                "codes": ["1-001H"],
                "primary_code": null,
                "power": null,
            }),
        )],
    )
    .await;
    let reconciler = reconciler(
        store.clone(),
        MemoryCatalog::new(vec![cloud()]),
        RecordingImages::new(),
        ReconcilerConfig::default(),
    );

    let summary = reconciler.run().await.unwrap();

    assert_eq!(summary.non_entity_cleared, 1);
    assert_eq!(summary.matched, 0);
    assert_eq!(summary.unmatched, 0);
    assert_eq!(summary.index_updates, 0);

    let stored = card(&store, "rules-1").await;
    assert_eq!(stored["code"], json!(null));
    assert_eq!(stored["codes"], json!(null));
    assert_eq!(stored["primary_code"], json!(null));
    assert_eq!(stored["power"], json!(null));
    assert_eq!(stored["name"], json!("Rules insert"));
    assert!(store.documents(FINGERPRINTS).await.is_empty());
    assert!(store.documents(SEARCH_INDEX).await.is_empty());

    let second = reconciler.run().await.unwrap();
    assert_eq!(second.non_entity_cleared, 0);
}

#[tokio::test]
async fn failed_images_get_the_placeholder() {
    init_test_tracing();
    let store = MemoryStore::new();
    seed_records(
        &store,
        CARDS,
        vec![
            local("card-1", json!({"code": "1-001H"})),
            local("card-2", json!({"code": "1-002R"})),
            local("card-3", json!({"code": "1-003C", "image_url": "images/custom.jpg"})),
        ],
    )
    .await;
    let with_images = |code: &str| CanonicalRecord {
        images: vec![format!("https://img.example.com/{code}.jpg")],
        ..canonical(code)
    };
    let images = RecordingImages::failing_on(["1-002R"]);
    let reconciler = reconciler(
        store.clone(),
        MemoryCatalog::new(vec![
            with_images("1-001H"),
            with_images("1-002R"),
            with_images("1-003C"),
        ]),
        images.clone(),
        ReconcilerConfig::default(),
    );

    let summary = reconciler.run().await.unwrap();

    assert_eq!(summary.image_failures, 1);
    assert_eq!(images.requests().await.len(), 2);

    let first = card(&store, "card-1").await;
    assert_eq!(first["image_url"], json!("images/1-001H.jpg"));
    assert_eq!(first["thumbnail_url"], json!("thumbnails/1-001H.jpg"));

    let second = card(&store, "card-2").await;
    assert_eq!(second["image_url"], json!(ImageConfig::DEFAULT_PLACEHOLDER_URL));
    assert_eq!(second["thumbnail_url"], json!(ImageConfig::DEFAULT_PLACEHOLDER_URL));

    let third = card(&store, "card-3").await;
    assert_eq!(third["image_url"], json!("images/custom.jpg"));
}

#[tokio::test]
async fn catalog_failures_fail_the_run_before_any_write() {
    init_test_tracing();
    let store = MemoryStore::new();
    seed_records(&store, CARDS, vec![local("card-1", cloud_local())]).await;
    let reconciler = reconciler(
        store.clone(),
        FailingCatalog,
        RecordingImages::new(),
        ReconcilerConfig::default(),
    );

    let err = reconciler.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CatalogRequestFailed);
    assert!(store.committed_batches().await.is_empty());
}

#[tokio::test]
async fn dry_runs_count_updates_without_writing() {
    init_test_tracing();
    let store = MemoryStore::new();
    seed_records(&store, CARDS, vec![local("card-1", cloud_local())]).await;
    let images = RecordingImages::new();
    let config = ReconcilerConfig {
        dry_run: true,
        ..ReconcilerConfig::default()
    };
    let reconciler = reconciler(
        store.clone(),
        MemoryCatalog::new(vec![cloud()]),
        images.clone(),
        config,
    );

    let summary = reconciler.run().await.unwrap();

    assert_eq!(summary.updated, 1);
    assert_eq!(summary.index_updates, 1);
    assert_eq!(summary.batches_committed, 0);
    assert!(store.committed_batches().await.is_empty());
    assert!(images.requests().await.is_empty());
    assert_eq!(card(&store, "card-1").await["power"], json!(null));
}

#[tokio::test]
async fn fingerprints_only_advance_with_their_update() {
    init_test_tracing();
    let memory = MemoryStore::new();
    seed_records(&memory, CARDS, vec![local("card-1", cloud_local())]).await;
    let store = FaultyStore::wrap(memory.clone());
    store.fail_next_commits([FaultType::Fatal]).await;
    let reconciler = reconciler(
        store.clone(),
        MemoryCatalog::new(vec![cloud()]),
        RecordingImages::new(),
        ReconcilerConfig::default(),
    );

    let err = reconciler.run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StoreCommitFailed);
    assert!(memory.documents(FINGERPRINTS).await.is_empty());
    assert_eq!(card(&memory, "card-1").await["power"], json!(null));

    let summary = reconciler.run().await.unwrap();

    assert_eq!(summary.updated, 1);
    assert_eq!(summary.skipped_unchanged, 0);
    assert_eq!(card(&memory, "card-1").await["power"], json!(7000));
    assert_eq!(memory.documents(FINGERPRINTS).await.len(), 1);
}

#[tokio::test]
async fn promo_and_extension_codes_are_preserved() {
    init_test_tracing();
    let store = MemoryStore::new();
    seed_records(
        &store,
        CARDS,
        vec![
            local(
                "promo-1",
                json!({
                    "name": "Cloud (Promo)",
                    "code": "PR-001/1-001H",
                    "power": null,
                }),
            ),
            local(
                "card-2",
                json!({
                    "name": "Tifa",
                    "code": "2-002R/Re-002R",
                    "codes": ["2-002R", "Re-002R"],
                    "primary_code": "2-002R",
                }),
            ),
        ],
    )
    .await;
    let tifa = CanonicalRecord {
        name: Some("Tifa".to_string()),
        ..canonical("2-002R")
    };
    let reconciler = reconciler(
        store.clone(),
        MemoryCatalog::new(vec![cloud(), tifa]),
        RecordingImages::new(),
        ReconcilerConfig::default(),
    );

    let summary = reconciler.run().await.unwrap();

    assert_eq!(summary.matched, 2);
    assert_eq!(summary.unmatched, 0);

    let promo = card(&store, "promo-1").await;
    assert_eq!(promo["name"], json!("Cloud (Promo)"));
    assert_eq!(promo["code"], json!("PR-001/1-001H"));
    assert_eq!(promo["power"], json!(7000));
    assert!(promo.get("codes").is_none());

    let extended = card(&store, "card-2").await;
    assert_eq!(extended["code"], json!("2-002R/Re-002R"));
    assert_eq!(extended["codes"], json!(["2-002R", "Re-002R"]));
    assert_eq!(extended["primary_code"], json!("2-002R"));
}

#[tokio::test]
async fn records_added_under_a_known_code_are_still_reconciled() {
    init_test_tracing();
    let store = MemoryStore::new();
    seed_records(&store, CARDS, vec![local("card-1", cloud_local())]).await;
    let reconciler = reconciler(
        store.clone(),
        MemoryCatalog::new(vec![cloud()]),
        RecordingImages::new(),
        ReconcilerConfig::default(),
    );
    reconciler.run().await.unwrap();

    seed_records(
        &store,
        CARDS,
        vec![local("promo-1", json!({"code": "PR-001/1-001H", "power": null}))],
    )
    .await;

    let second = reconciler.run().await.unwrap();

    assert_eq!(second.matched, 2);
    assert_eq!(second.skipped_unchanged, 1);
    assert_eq!(second.updated, 1);
    assert_eq!(card(&store, "promo-1").await["power"], json!(7000));
    let fingerprint = store
        .document(&DocumentKey::new(FINGERPRINTS, fingerprint_key("1-001H")))
        .await
        .unwrap();
    assert_eq!(fingerprint["record_ids"], json!(["card-1", "promo-1"]));

    let third = reconciler.run().await.unwrap();

    assert_eq!(third.skipped_unchanged, 2);
    assert_eq!(third.updated, 0);
}

#[tokio::test]
async fn search_index_holds_name_prefixes_and_codes() {
    init_test_tracing();
    let store = MemoryStore::new();
    seed_records(&store, CARDS, vec![local("card-1", cloud_local())]).await;
    let named = CanonicalRecord {
        name: Some("Cloud".to_string()),
        ..cloud()
    };
    let reconciler = reconciler(
        store.clone(),
        MemoryCatalog::new(vec![named]),
        RecordingImages::new(),
        ReconcilerConfig::default(),
    );

    reconciler.run().await.unwrap();

    let index = store
        .document(&DocumentKey::new(SEARCH_INDEX, "card-1"))
        .await
        .unwrap();
    assert_eq!(
        index["terms"],
        json!(["1001h", "cl", "clo", "clou", "cloud"])
    );
}

#[tokio::test]
async fn catalog_order_does_not_change_the_outcome() {
    init_test_tracing();
    let catalog: Vec<CanonicalRecord> = (1..=20)
        .map(|index| CanonicalRecord {
            power: Some(format!("{}", index * 1000)),
            rarity: Some("R".to_string()),
            ..canonical(&format!("1-{index:03}R"))
        })
        .collect();
    let locals = || {
        (1..=20)
            .map(|index| local(&format!("card-{index:02}"), json!({ "code": format!("1-{index:03}R") })))
            .collect::<Vec<_>>()
    };

    let ordered = MemoryStore::new();
    seed_records(&ordered, CARDS, locals()).await;
    reconciler(
        ordered.clone(),
        MemoryCatalog::new(catalog.clone()),
        RecordingImages::new(),
        ReconcilerConfig::default(),
    )
    .run()
    .await
    .unwrap();

    let mut shuffled_catalog = catalog;
    shuffled_catalog.shuffle(&mut StdRng::seed_from_u64(7));
    let shuffled = MemoryStore::new();
    seed_records(&shuffled, CARDS, locals()).await;
    reconciler(
        shuffled.clone(),
        MemoryCatalog::new(shuffled_catalog),
        RecordingImages::new(),
        ReconcilerConfig::default(),
    )
    .run()
    .await
    .unwrap();

    let strip_timestamps = |documents: std::collections::BTreeMap<String, Document>| {
        documents
            .into_iter()
            .map(|(id, mut document)| {
                document.remove("last_updated");
                (id, document)
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(
        strip_timestamps(ordered.documents(CARDS).await),
        strip_timestamps(shuffled.documents(CARDS).await)
    );
    assert_eq!(
        strip_timestamps(ordered.documents(FINGERPRINTS).await),
        strip_timestamps(shuffled.documents(FINGERPRINTS).await)
    );
}
