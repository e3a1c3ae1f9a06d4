use std::collections::{BTreeMap, HashMap};

use ::postgres::documents::{
    DocumentQuery, DocumentRow, DocumentWrite, DocumentWriteError, apply_document_writes,
    get_document, get_documents, query_documents,
};
use sqlx::PgPool;
use sqlx::types::Json;

use crate::error::{ErrorKind, SyncError, SyncResult};
use crate::store::{DocumentStore, Mutation, Order, Query, WriteBatch};
use crate::sync_error;
use crate::types::{Document, DocumentKey};

/// Document store backed by the `documents` table of a Postgres database.
///
/// Each committed [`WriteBatch`] runs in one transaction.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wraps a pool created by [`::postgres::db::connect_document_store`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DocumentStore for PostgresStore {
    async fn get(&self, key: &DocumentKey) -> SyncResult<Option<Document>> {
        Ok(get_document(&self.pool, &key.collection, &key.id).await?)
    }

    /// Reads all keys with one query per collection.
    async fn get_all(&self, keys: &[DocumentKey]) -> SyncResult<Vec<Option<Document>>> {
        let mut ids_by_collection: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for key in keys {
            ids_by_collection
                .entry(key.collection.as_str())
                .or_default()
                .push(key.id.clone());
        }

        let mut found = HashMap::with_capacity(keys.len());
        for (collection, ids) in ids_by_collection {
            let rows = get_documents(&self.pool, collection, &ids).await?;
            found.extend(rows_by_key(collection, rows));
        }

        Ok(in_key_order(keys, &found))
    }

    async fn query(&self, query: &Query) -> SyncResult<Vec<(String, Document)>> {
        if query.order_by == Order::Descending {
            return Err(sync_error!(
                ErrorKind::InvalidQuery,
                "Descending queries are not supported by the Postgres store"
            ));
        }

        let limit = query
            .limit
            .map(|limit| {
                i64::try_from(limit).map_err(|_| {
                    sync_error!(ErrorKind::InvalidQuery, "Query limit is too large", limit)
                })
            })
            .transpose()?;

        let filters: Vec<(String, serde_json::Value)> = query
            .filters
            .iter()
            .map(|filter| (filter.field.clone(), filter.value.clone()))
            .collect();

        let rows = query_documents(
            &self.pool,
            DocumentQuery {
                collection: &query.collection,
                filters: &filters,
                start_after: query.start_after.as_deref(),
                limit,
            },
        )
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let Json(data) = row.data;
                (row.id, data)
            })
            .collect())
    }

    async fn commit(&self, batch: &WriteBatch) -> SyncResult<()> {
        let writes: Vec<DocumentWrite<'_>> = batch
            .mutations()
            .iter()
            .map(|mutation| match mutation {
                Mutation::Set { key, fields, merge } => DocumentWrite::Set {
                    collection: &key.collection,
                    id: &key.id,
                    data: fields,
                    merge: *merge,
                },
                Mutation::Update { key, fields } => DocumentWrite::Update {
                    collection: &key.collection,
                    id: &key.id,
                    fields,
                },
            })
            .collect();

        apply_document_writes(&self.pool, &writes)
            .await
            .map_err(SyncError::from)
    }
}

fn rows_by_key(
    collection: &str,
    rows: Vec<DocumentRow>,
) -> impl Iterator<Item = (DocumentKey, Document)> + '_ {
    rows.into_iter().map(move |row| {
        let Json(data) = row.data;
        (DocumentKey::new(collection, row.id), data)
    })
}

/// Lines up fetched documents with the requested keys.
fn in_key_order(keys: &[DocumentKey], found: &HashMap<DocumentKey, Document>) -> Vec<Option<Document>> {
    keys.iter().map(|key| found.get(key).cloned()).collect()
}

impl From<DocumentWriteError> for SyncError {
    #[track_caller]
    fn from(err: DocumentWriteError) -> SyncError {
        match err {
            DocumentWriteError::Database(err) => SyncError::from(err),
            DocumentWriteError::MissingDocument { collection, id } => sync_error!(
                ErrorKind::DocumentNotFound,
                "Cannot update a missing document",
                format!("document `{collection}/{id}` does not exist")
            ),
        }
    }
}
