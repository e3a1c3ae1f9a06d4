use serde_json::Value;
use tracing::info;

use crate::concurrency::BatchWriteCoordinator;
use crate::error::SyncResult;
use crate::indexing::search_terms;
use crate::matching::PromoPatterns;
use crate::store::{DocumentStore, SetOptions, WriteBatch};
use crate::types::{Document, DocumentKey, LocalRecord};

/// Field of an index document holding its terms.
pub const INDEX_TERMS_FIELD: &str = "terms";

/// Number of index documents read per `get_all` call.
const READ_CHUNK: usize = 500;

/// Outcome of a search index pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Index documents written.
    pub updated: usize,
    /// Records whose stored terms were already current.
    pub unchanged: usize,
    pub batches_committed: usize,
}

/// Writes the search terms of every entity record to `collection`, keyed by record id.
///
/// Records flagged as non-entity get no index document. Stored documents holding the same terms
/// are not rewritten. With `dry_run` nothing is submitted and `updated` counts the documents
/// that would have been written.
pub async fn index_records<S>(
    store: &S,
    coordinator: &mut BatchWriteCoordinator<S>,
    records: &[LocalRecord],
    collection: &str,
    promo: &PromoPatterns,
    dry_run: bool,
) -> SyncResult<IndexReport>
where
    S: DocumentStore + Clone + Send + Sync + 'static,
{
    let mut report = IndexReport::default();
    let entities: Vec<&LocalRecord> = records.iter().filter(|record| !record.is_non_entity()).collect();

    for chunk in entities.chunks(READ_CHUNK) {
        let keys: Vec<DocumentKey> = chunk
            .iter()
            .map(|record| DocumentKey::new(collection, record.id.clone()))
            .collect();
        let stored = store.get_all(&keys).await?;

        for ((record, key), existing) in chunk.iter().zip(keys).zip(stored) {
            let terms = search_terms(record, promo);
            let terms = Value::from(terms);
            if existing
                .as_ref()
                .and_then(|document| document.get(INDEX_TERMS_FIELD))
                == Some(&terms)
            {
                report.unchanged += 1;
                continue;
            }

            report.updated += 1;
            if dry_run {
                continue;
            }

            let mut fields = Document::new();
            fields.insert(INDEX_TERMS_FIELD.to_string(), terms);
            coordinator
                .submit(Box::new(move |batch: &mut WriteBatch| {
                    batch.set(key, fields, SetOptions::default());
                }))
                .await?;
        }
    }

    if !dry_run {
        let flush = coordinator.flush().await?;
        report.batches_committed = flush.batches_committed;
    }

    info!(
        collection,
        updated = report.updated,
        unchanged = report.unchanged,
        batches = report.batches_committed,
        dry_run,
        "search index updated"
    );

    Ok(report)
}
