use std::future::Future;

use serde_json::Value;

use crate::error::SyncResult;
use crate::store::WriteBatch;
use crate::types::{Document, DocumentKey, LocalRecord};

/// Equality filter on a top-level document field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Ordering of query results by document id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    #[default]
    Ascending,
    Descending,
}

/// Filtered read over one collection with cursor pagination on the document id.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Order,
    pub limit: Option<usize>,
    /// Only documents ordered strictly after this id are returned.
    pub start_after: Option<String>,
}

impl Query {
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: Order::default(),
            limit: None,
            start_after: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, order: Order) -> Self {
        self.order_by = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start_after(mut self, id: impl Into<String>) -> Self {
        self.start_after = Some(id.into());
        self
    }
}

/// Document database the reconciler reads local records from and writes updates to.
///
/// [`DocumentStore::commit`] is atomic. Transient failures are reported as
/// [`crate::error::ErrorKind::StoreUnavailable`] or
/// [`crate::error::ErrorKind::StoreDeadlineExceeded`]; every other kind is treated as fatal.
pub trait DocumentStore {
    /// Returns the document stored under `key`.
    fn get(&self, key: &DocumentKey) -> impl Future<Output = SyncResult<Option<Document>>> + Send;

    /// Returns the documents stored under `keys`, in the order of `keys`.
    fn get_all(
        &self,
        keys: &[DocumentKey],
    ) -> impl Future<Output = SyncResult<Vec<Option<Document>>>> + Send;

    /// Runs `query` and returns the matching documents with their ids.
    fn query(&self, query: &Query) -> impl Future<Output = SyncResult<Vec<(String, Document)>>> + Send;

    /// Applies every mutation of `batch`, or none of them.
    fn commit(&self, batch: &WriteBatch) -> impl Future<Output = SyncResult<()>> + Send;
}

/// Reads every document of `collection` page by page, ordered by id.
pub async fn load_collection<S>(
    store: &S,
    collection: &str,
    page_size: usize,
) -> SyncResult<Vec<LocalRecord>>
where
    S: DocumentStore,
{
    let page_size = page_size.max(1);
    let mut records = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let mut query = Query::collection(collection).limit(page_size);
        if let Some(cursor) = cursor.take() {
            query = query.start_after(cursor);
        }

        let page = store.query(&query).await?;
        let page_len = page.len();
        cursor = page.last().map(|(id, _)| id.clone());
        records.extend(page.into_iter().map(|(id, data)| LocalRecord::new(id, data)));

        if page_len < page_size {
            break;
        }
    }

    Ok(records)
}
