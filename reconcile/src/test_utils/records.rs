use serde_json::Value;

use crate::store::memory::MemoryStore;
use crate::types::{CanonicalRecord, Document, DocumentKey, LocalRecord};

/// Returns a canonical record with only `code` set.
pub fn canonical(code: &str) -> CanonicalRecord {
    CanonicalRecord {
        code: code.to_string(),
        ..Default::default()
    }
}

/// Builds a local record from a JSON object.
///
/// # Panics
///
/// Panics if `data` is not a JSON object.
pub fn local(id: &str, data: Value) -> LocalRecord {
    let Value::Object(data) = data else {
        panic!("local record `{id}` must be a JSON object");
    };

    LocalRecord::new(id, data)
}

/// Builds a document from a JSON object.
///
/// # Panics
///
/// Panics if `data` is not a JSON object.
pub fn document(data: Value) -> Document {
    match data {
        Value::Object(document) => document,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Inserts `records` into `collection` without going through a commit.
pub async fn seed_records(store: &MemoryStore, collection: &str, records: Vec<LocalRecord>) {
    for record in records {
        store
            .insert(DocumentKey::new(collection, record.id), record.data)
            .await;
    }
}
