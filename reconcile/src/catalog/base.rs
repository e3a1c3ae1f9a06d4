use std::future::Future;

use serde_json::Value;
use tracing::warn;

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::types::CanonicalRecord;

/// Reference catalog holding the canonical records.
pub trait CatalogSource {
    /// Returns every canonical record, in source order.
    ///
    /// A failure here fails the whole run.
    fn fetch_all(&self) -> impl Future<Output = SyncResult<Vec<CanonicalRecord>>> + Send;
}

/// Extracts canonical records from a catalog response body.
///
/// The body is either an array of records or an object whose `records_field` holds that array.
/// Records without an identifier code are dropped.
pub fn parse_records(body: Value, records_field: Option<&str>) -> SyncResult<Vec<CanonicalRecord>> {
    let items = match (body, records_field) {
        (Value::Array(items), _) => items,
        (Value::Object(mut object), Some(field)) => match object.remove(field) {
            Some(Value::Array(items)) => items,
            Some(_) => bail!(
                ErrorKind::CatalogInvalidResponse,
                "Catalog records field is not an array",
                format!("The field '{field}' of the catalog response is not an array")
            ),
            None => bail!(
                ErrorKind::CatalogInvalidResponse,
                "Catalog records field is missing",
                format!("The catalog response has no field '{field}'")
            ),
        },
        (_, _) => bail!(
            ErrorKind::CatalogInvalidResponse,
            "Catalog response is not a list of records"
        ),
    };

    let mut records = Vec::with_capacity(items.len());
    let mut dropped = 0usize;
    for item in items {
        let record: CanonicalRecord = serde_json::from_value(item)?;
        if record.code.trim().is_empty() {
            dropped += 1;
            continue;
        }
        records.push(record);
    }

    if dropped > 0 {
        warn!(dropped, "catalog records without identifier code were dropped");
    }

    Ok(records)
}
