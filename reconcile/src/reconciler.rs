//! One reconciliation run: fetch, match, fingerprint, merge, write, index.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use config::shared::{ImageConfig, ReconcilerConfig, WriteBatchConfig};
use futures::{StreamExt, stream};
use serde_json::Value;
use tracing::{debug, info};

use crate::catalog::CatalogSource;
use crate::concurrency::BatchWriteCoordinator;
use crate::error::SyncResult;
use crate::failpoints::{RECONCILER_BEFORE_FLUSH, sync_fail_point};
use crate::fingerprint::{
    FINGERPRINT_FIELD, Fingerprint, RECORD_IDS_FIELD, StoredFingerprint, fingerprint,
    fingerprint_key,
};
use crate::images::{ImageProcessor, ImageRequest, fill_images};
use crate::indexing::index_records;
use crate::matching::{CanonicalIndex, IdentifierMatcher};
use crate::merge::{FieldMergeResolver, FieldUpdates};
use crate::metrics::record_run;
use crate::store::{DocumentStore, SetOptions, WriteBatch, load_collection};
use crate::types::{
    CODE_FIELD, CanonicalRecord, Document, DocumentKey, LAST_UPDATED_FIELD, LocalRecord,
};

/// Number of fingerprint documents read per `get_all` call.
const FINGERPRINT_READ_CHUNK: usize = 500;

/// Counters of a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Local records read.
    pub processed: usize,
    /// Entity records paired with a canonical record.
    pub matched: usize,
    /// Entity records without canonical counterpart.
    pub unmatched: usize,
    /// Matched records skipped because their fingerprint did not change.
    pub skipped_unchanged: usize,
    /// Records that received field updates.
    pub updated: usize,
    /// Non-entity records whose identifier fields were cleared.
    pub non_entity_cleared: usize,
    /// Records that got the placeholder image.
    pub image_failures: usize,
    /// Search index documents written.
    pub index_updates: usize,
    pub batches_committed: usize,
    pub duration: Duration,
}

/// Fingerprint document of one canonical code.
///
/// It is written in the same operation as the updates of every record matched to the code, so it
/// never lists a record whose update did not land.
#[derive(Debug)]
struct FingerprintGroup {
    key: String,
    canonical_code: String,
    fingerprint: Fingerprint,
    /// Sorted ids of every record matched to the code in this run.
    record_ids: Vec<String>,
    /// Whether the stored document differs from this one.
    stale: bool,
}

impl FingerprintGroup {
    fn document(&self) -> Document {
        let mut document = Document::new();
        document.insert(FINGERPRINT_FIELD.to_string(), Value::from(self.fingerprint.as_str()));
        document.insert(CODE_FIELD.to_string(), Value::from(self.canonical_code.as_str()));
        document.insert(RECORD_IDS_FIELD.to_string(), Value::from(self.record_ids.clone()));
        document.insert(
            LAST_UPDATED_FIELD.to_string(),
            Value::from(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );

        document
    }
}

#[derive(Debug)]
struct PendingUpdate {
    /// Position of the record in the loaded local records.
    position: usize,
    updates: FieldUpdates,
    /// Slot of the fingerprint group of a matched record.
    group: Option<usize>,
    image: Option<ImageRequest>,
    non_entity: bool,
}

/// Reconciles the local record collection against a catalog.
///
/// A run is a single writer stream: every update goes through one [`BatchWriteCoordinator`]
/// and the run ends after its final flush.
#[derive(Debug)]
pub struct Reconciler<S, C, I> {
    store: S,
    catalog: C,
    images: I,
    config: ReconcilerConfig,
    batch_config: WriteBatchConfig,
    image_config: ImageConfig,
    matcher: IdentifierMatcher,
    resolver: FieldMergeResolver,
}

impl<S, C, I> Reconciler<S, C, I>
where
    S: DocumentStore + Clone + Send + Sync + 'static,
    C: CatalogSource,
    I: ImageProcessor + Sync,
{
    pub fn new(
        store: S,
        catalog: C,
        images: I,
        config: ReconcilerConfig,
        batch_config: WriteBatchConfig,
        image_config: ImageConfig,
    ) -> SyncResult<Self> {
        let matcher = IdentifierMatcher::from_config(&config.matching)?;
        let resolver = FieldMergeResolver::new(matcher.clone(), &config.merge);

        Ok(Self {
            store,
            catalog,
            images,
            config,
            batch_config,
            image_config,
            matcher,
            resolver,
        })
    }

    /// Runs one reconciliation.
    ///
    /// Catalog and store failures end the run with an error. Image failures only produce a
    /// placeholder. Units committed before a failed flush stay committed, and the next run picks
    /// up the remaining records because their fingerprints were not advanced.
    pub async fn run(&self) -> SyncResult<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary::default();

        let canonicals = self.catalog.fetch_all().await?;
        let mut locals = load_collection(
            &self.store,
            &self.config.records_collection,
            self.config.page_size,
        )
        .await?;
        summary.processed = locals.len();

        info!(
            canonical_records = canonicals.len(),
            local_records = locals.len(),
            dry_run = self.config.dry_run,
            "reconciliation started"
        );

        let (groups, mut pending) = self.resolve_all(&canonicals, &locals, &mut summary).await?;
        if !self.config.dry_run {
            self.fill_images(&mut pending, &mut summary).await;
        }

        let mut coordinator =
            BatchWriteCoordinator::new(self.store.clone(), self.batch_config.clone());
        let mut group_updates: Vec<Vec<(DocumentKey, Document)>> =
            groups.iter().map(|_| Vec::new()).collect();
        for update in pending {
            if update.updates.is_empty() {
                continue;
            }

            if update.non_entity {
                summary.non_entity_cleared += 1;
            } else {
                summary.updated += 1;
            }

            let local = &mut locals[update.position];
            *local = local.with_updates(update.updates.fields());

            if self.config.dry_run {
                continue;
            }

            let record_key = DocumentKey::new(&self.config.records_collection, local.id.clone());
            let fields = update.updates.into_fields();
            match update.group {
                Some(slot) => group_updates[slot].push((record_key, fields)),
                None => {
                    coordinator
                        .submit(Box::new(move |batch: &mut WriteBatch| {
                            batch.update(record_key, fields);
                        }))
                        .await?;
                }
            }
        }

        if !self.config.dry_run {
            for (group, updates) in groups.into_iter().zip(group_updates) {
                if updates.is_empty() && !group.stale {
                    continue;
                }

                let key = DocumentKey::new(&self.config.fingerprints_collection, group.key.clone());
                let document = group.document();
                coordinator
                    .submit(Box::new(move |batch: &mut WriteBatch| {
                        for (record_key, fields) in updates {
                            batch.update(record_key, fields);
                        }
                        batch.set(key, document, SetOptions::merge());
                    }))
                    .await?;
            }

            sync_fail_point(RECONCILER_BEFORE_FLUSH)?;
            let report = coordinator.flush().await?;
            summary.batches_committed += report.batches_committed;
        }

        if self.config.build_search_index {
            let report = index_records(
                &self.store,
                &mut coordinator,
                &locals,
                &self.config.index_collection,
                self.matcher.promo_patterns(),
                self.config.dry_run,
            )
            .await?;
            summary.index_updates = report.updated;
            summary.batches_committed += report.batches_committed;
        }

        summary.duration = started.elapsed();
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
            "reconciliation finished"
        );
        record_run(&summary);

        Ok(summary)
    }

    /// Pairs every local record and computes its updates.
    ///
    /// Matched records are grouped per canonical code. A record is skipped when the stored
    /// fingerprint of its code is unchanged and already lists the record.
    async fn resolve_all(
        &self,
        canonicals: &[CanonicalRecord],
        locals: &[LocalRecord],
        summary: &mut RunSummary,
    ) -> SyncResult<(Vec<FingerprintGroup>, Vec<PendingUpdate>)> {
        let index = CanonicalIndex::build(&self.matcher, canonicals);
        let mut pending = Vec::new();
        let mut matched: Vec<(&CanonicalRecord, Vec<usize>)> = Vec::new();
        let mut slots: HashMap<String, usize> = HashMap::new();

        for (position, local) in locals.iter().enumerate() {
            if local.is_non_entity() {
                pending.push(PendingUpdate {
                    position,
                    updates: self.resolver.clear_non_entity(local),
                    group: None,
                    image: None,
                    non_entity: true,
                });
                continue;
            }

            match index.find(local) {
                Some((_, canonical)) => {
                    let slot = *slots.entry(fingerprint_key(&canonical.code)).or_insert_with(|| {
                        matched.push((canonical, Vec::new()));
                        matched.len() - 1
                    });
                    matched[slot].1.push(position);
                    summary.matched += 1;
                }
                None => {
                    debug!(record_id = %local.id, "no canonical record matches");
                    summary.unmatched += 1;
                }
            }
        }

        let mut groups = Vec::with_capacity(matched.len());
        for (canonical, positions) in &matched {
            let canonical_codes = self.matcher.canonical_codes(canonical);
            let extensions: Vec<String> = positions
                .iter()
                .flat_map(|&position| self.resolver.local_extensions(&locals[position], canonical))
                .collect();
            let mut record_ids: Vec<String> = positions
                .iter()
                .map(|&position| locals[position].id.clone())
                .collect();
            record_ids.sort();
            record_ids.dedup();

            groups.push(FingerprintGroup {
                key: fingerprint_key(&canonical.code),
                canonical_code: canonical.code.clone(),
                fingerprint: fingerprint(canonical, &canonical_codes, &extensions)?,
                record_ids,
                stale: true,
            });
        }

        let stored = self.stored_fingerprints(&groups).await?;
        for (slot, ((canonical, positions), stored)) in matched.iter().zip(stored).enumerate() {
            let group = &mut groups[slot];
            let stale = stored.as_ref().is_none_or(|stored| {
                stored.fingerprint != group.fingerprint || stored.record_ids != group.record_ids
            });
            group.stale = stale;

            for &position in positions {
                let local = &locals[position];
                if stored
                    .as_ref()
                    .is_some_and(|stored| stored.covers(&group.fingerprint, &local.id))
                {
                    debug!(record_id = %local.id, code = %canonical.code, "fingerprint unchanged");
                    summary.skipped_unchanged += 1;
                    continue;
                }

                let updates = self.resolver.resolve(local, canonical);
                let image = (self.image_config.enabled
                    && self.resolver.needs_images(local, canonical))
                .then(|| ImageRequest {
                    record_id: local.id.clone(),
                    code: canonical.code.clone(),
                    sources: canonical.images.clone(),
                });

                pending.push(PendingUpdate {
                    position,
                    updates,
                    group: Some(slot),
                    image,
                    non_entity: false,
                });
            }
        }

        pending.sort_by_key(|update| update.position);

        Ok((groups, pending))
    }

    /// Reads the stored fingerprint document of every group, in order.
    async fn stored_fingerprints(
        &self,
        groups: &[FingerprintGroup],
    ) -> SyncResult<Vec<Option<StoredFingerprint>>> {
        let mut stored = Vec::with_capacity(groups.len());

        for chunk in groups.chunks(FINGERPRINT_READ_CHUNK) {
            let keys: Vec<DocumentKey> = chunk
                .iter()
                .map(|group| DocumentKey::new(&self.config.fingerprints_collection, group.key.clone()))
                .collect();

            let documents = self.store.get_all(&keys).await?;
            stored.extend(
                documents
                    .into_iter()
                    .map(|document| document.as_ref().and_then(StoredFingerprint::from_document)),
            );
        }

        Ok(stored)
    }

    /// Requests images for pending updates, a bounded number at a time.
    async fn fill_images(&self, pending: &mut [PendingUpdate], summary: &mut RunSummary) {
        let placeholder = self.image_config.placeholder_url.as_str();
        let concurrency = self.image_config.concurrency.max(1);

        let fills: Vec<(usize, _)> = stream::iter(
            pending
                .iter()
                .enumerate()
                .filter_map(|(slot, update)| update.image.as_ref().map(|request| (slot, request))),
        )
        .map(|(slot, request)| async move {
            (slot, fill_images(&self.images, request, placeholder).await)
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

        for (slot, fill) in fills {
            if fill.failed {
                summary.image_failures += 1;
            }

            let update = &mut pending[slot];
            for (field, value) in fill.fields {
                update.updates.insert(field, value);
            }
        }
    }
}
