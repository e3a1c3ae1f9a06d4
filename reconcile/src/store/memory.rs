use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::store::{DocumentStore, Mutation, Order, Query, WriteBatch};
use crate::types::{Document, DocumentKey};

type Collections = BTreeMap<String, BTreeMap<String, Document>>;

#[derive(Debug, Default)]
struct Inner {
    collections: Collections,
    committed_batches: Vec<WriteBatch>,
}

/// In-memory document store used by tests and dry runs.
///
/// The content can be loaded from and saved to a JSON snapshot shaped as
/// `{collection: {id: document}}`. Cloning shares the same documents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a store from a snapshot file. A missing file yields an empty store.
    pub async fn load_snapshot(path: &Path) -> SyncResult<Self> {
        let collections: Collections = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "snapshot not found, starting from an empty store");
                Collections::new()
            }
            Err(err) => return Err(err.into()),
        };

        let documents: usize = collections.values().map(BTreeMap::len).sum();
        info!(path = %path.display(), documents, "memory store snapshot loaded");

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                collections,
                committed_batches: Vec::new(),
            })),
        })
    }

    /// Writes every document to a snapshot file.
    pub async fn save_snapshot(&self, path: &Path) -> SyncResult<()> {
        let bytes = {
            let inner = self.inner.lock().await;
            serde_json::to_vec_pretty(&inner.collections)?
        };

        tokio::fs::write(path, bytes).await?;
        info!(path = %path.display(), "memory store snapshot saved");

        Ok(())
    }

    /// Stores `document` under `key`, replacing any previous document.
    pub async fn insert(&self, key: DocumentKey, document: Document) {
        let mut inner = self.inner.lock().await;
        inner
            .collections
            .entry(key.collection)
            .or_default()
            .insert(key.id, document);
    }

    /// Returns the document stored under `key`.
    pub async fn document(&self, key: &DocumentKey) -> Option<Document> {
        let inner = self.inner.lock().await;
        inner
            .collections
            .get(&key.collection)
            .and_then(|documents| documents.get(&key.id))
            .cloned()
    }

    /// Returns every document of `collection`, keyed by id.
    pub async fn documents(&self, collection: &str) -> BTreeMap<String, Document> {
        let inner = self.inner.lock().await;
        inner
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the batches committed so far, in commit order.
    pub async fn committed_batches(&self) -> Vec<WriteBatch> {
        self.inner.lock().await.committed_batches.clone()
    }
}

impl DocumentStore for MemoryStore {
    async fn get(&self, key: &DocumentKey) -> SyncResult<Option<Document>> {
        Ok(self.document(key).await)
    }

    async fn get_all(&self, keys: &[DocumentKey]) -> SyncResult<Vec<Option<Document>>> {
        let inner = self.inner.lock().await;
        let documents = keys
            .iter()
            .map(|key| {
                inner
                    .collections
                    .get(&key.collection)
                    .and_then(|documents| documents.get(&key.id))
                    .cloned()
            })
            .collect();

        Ok(documents)
    }

    async fn query(&self, query: &Query) -> SyncResult<Vec<(String, Document)>> {
        if query.limit == Some(0) {
            bail!(ErrorKind::InvalidQuery, "Query limit must be positive");
        }

        let inner = self.inner.lock().await;
        let Some(documents) = inner.collections.get(&query.collection) else {
            return Ok(Vec::new());
        };

        let matches_filters = |document: &Document| {
            query
                .filters
                .iter()
                .all(|filter| document.get(&filter.field) == Some(&filter.value))
        };

        let candidates: Box<dyn Iterator<Item = (&String, &Document)>> = match query.order_by {
            Order::Ascending => Box::new(documents.iter()),
            Order::Descending => Box::new(documents.iter().rev()),
        };

        let results = candidates
            .filter(|(id, _)| match (&query.start_after, query.order_by) {
                (None, _) => true,
                (Some(cursor), Order::Ascending) => id.as_str() > cursor.as_str(),
                (Some(cursor), Order::Descending) => id.as_str() < cursor.as_str(),
            })
            .filter(|(_, document)| matches_filters(document))
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|(id, document)| (id.clone(), document.clone()))
            .collect();

        Ok(results)
    }

    async fn commit(&self, batch: &WriteBatch) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;

        // Validate before applying anything so a failing batch leaves no trace.
        for mutation in batch.mutations() {
            if let Mutation::Update { key, .. } = mutation {
                let exists = inner
                    .collections
                    .get(&key.collection)
                    .is_some_and(|documents| documents.contains_key(&key.id));
                if !exists {
                    bail!(
                        ErrorKind::DocumentNotFound,
                        "Cannot update a missing document",
                        format!("document `{key}` does not exist")
                    );
                }
            }
        }

        for mutation in batch.mutations() {
            apply_mutation(&mut inner.collections, mutation);
        }
        inner.committed_batches.push(batch.clone());

        debug!(mutations = batch.len(), "memory store batch committed");

        Ok(())
    }
}

fn apply_mutation(collections: &mut Collections, mutation: &Mutation) {
    match mutation {
        Mutation::Set {
            key,
            fields,
            merge: false,
        } => {
            collections
                .entry(key.collection.clone())
                .or_default()
                .insert(key.id.clone(), fields.clone());
        }
        Mutation::Set {
            key,
            fields,
            merge: true,
        }
        | Mutation::Update { key, fields } => {
            let document = collections
                .entry(key.collection.clone())
                .or_default()
                .entry(key.id.clone())
                .or_default();
            for (field, value) in fields {
                document.insert(field.clone(), value.clone());
            }
        }
    }
}
