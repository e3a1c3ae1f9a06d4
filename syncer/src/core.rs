use ::config::shared::{
    CatalogConfig, CatalogPagination, PgConnectionConfig, StoreConfig, SyncerConfig,
    WriteBatchConfig,
};
use postgres::db::connect_document_store;
use postgres::migrations::migrate_document_store;
use reconcile::catalog::HttpCatalog;
use reconcile::images::PassthroughImages;
use reconcile::reconciler::{Reconciler, RunSummary};
use reconcile::store::DocumentStore;
use reconcile::store::memory::MemoryStore;
use reconcile::store::postgres::PostgresStore;
use tracing::{debug, info};

/// Runs one reconciliation with the store, catalog and image collaborator named by `config`.
///
/// A memory store with a snapshot path is loaded from the snapshot first and saved back after
/// the run, unless the run is a dry run.
pub async fn start_syncer_with_config(config: SyncerConfig) -> anyhow::Result<()> {
    info!("starting catalog sync");

    log_config(&config);

    let catalog = HttpCatalog::new(config.catalog.clone())?;

    let summary = match &config.store {
        StoreConfig::Memory { snapshot_path } => {
            let store = match snapshot_path {
                Some(path) => MemoryStore::load_snapshot(path).await?,
                None => MemoryStore::new(),
            };

            let summary = run_reconciliation(store.clone(), catalog, &config).await?;

            if let Some(path) = snapshot_path {
                if !config.reconciler.dry_run {
                    store.save_snapshot(path).await?;
                }
            }

            summary
        }
        StoreConfig::Postgres {
            connection,
            max_connections,
        } => {
            let pool = connect_document_store(connection, *max_connections).await?;
            migrate_document_store(&pool).await?;

            run_reconciliation(PostgresStore::new(pool), catalog, &config).await?
        }
    };

    info!(
        processed = summary.processed,
        matched = summary.matched,
        unmatched = summary.unmatched,
        skipped_unchanged = summary.skipped_unchanged,
        updated = summary.updated,
        non_entity_cleared = summary.non_entity_cleared,
        image_failures = summary.image_failures,
        index_updates = summary.index_updates,
        batches_committed = summary.batches_committed,
        duration_ms = summary.duration.as_millis() as u64,
        dry_run = config.reconciler.dry_run,
        "catalog sync completed"
    );

    Ok(())
}

#[tracing::instrument(skip_all)]
async fn run_reconciliation<S>(
    store: S,
    catalog: HttpCatalog,
    config: &SyncerConfig,
) -> anyhow::Result<RunSummary>
where
    S: DocumentStore + Clone + Send + Sync + 'static,
{
    let reconciler = Reconciler::new(
        store,
        catalog,
        PassthroughImages,
        config.reconciler.clone(),
        config.batch.clone(),
        config.images.clone(),
    )?;

    Ok(reconciler.run().await?)
}

fn log_config(config: &SyncerConfig) {
    log_store_config(&config.store);
    log_catalog_config(&config.catalog);
    log_batch_config(&config.batch);
    debug!(
        records_collection = config.reconciler.records_collection,
        fingerprints_collection = config.reconciler.fingerprints_collection,
        index_collection = config.reconciler.index_collection,
        page_size = config.reconciler.page_size,
        dry_run = config.reconciler.dry_run,
        build_search_index = config.reconciler.build_search_index,
        images_enabled = config.images.enabled,
        "reconciler config"
    );
}

fn log_store_config(config: &StoreConfig) {
    match config {
        StoreConfig::Memory { snapshot_path } => {
            debug!(
                snapshot_path = ?snapshot_path,
                "using memory document store config"
            );
        }
        StoreConfig::Postgres {
            connection,
            max_connections,
        } => {
            debug!(max_connections, "using postgres document store config");
            log_pg_connection_config(connection);
        }
    }
}

fn log_pg_connection_config(config: &PgConnectionConfig) {
    debug!(
        host = config.host,
        port = config.port,
        dbname = config.name,
        username = config.username,
        tls_enabled = config.tls.enabled,
        "document store postgres connection config",
    );
}

fn log_catalog_config(config: &CatalogConfig) {
    let paged = matches!(config.pagination, CatalogPagination::Paged { .. });
    debug!(
        url = config.url,
        records_field = ?config.records_field,
        paged,
        request_timeout_ms = config.request_timeout_ms,
        "catalog config"
    );
}

fn log_batch_config(config: &WriteBatchConfig) {
    debug!(
        max_batch_size = config.max_batch_size,
        pool_size = config.pool_size,
        max_concurrent_commits = config.max_concurrent_commits,
        min_concurrent_commits = config.min_concurrent_commits,
        flush_fan_out = config.flush_fan_out,
        commit_timeout_ms = config.commit_timeout_ms,
        max_retries = config.max_retries,
        "batch config"
    );
}
