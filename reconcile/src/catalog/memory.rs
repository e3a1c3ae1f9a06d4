use std::sync::Arc;

use crate::catalog::CatalogSource;
use crate::error::SyncResult;
use crate::types::CanonicalRecord;

/// Catalog serving a fixed list of records.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    records: Arc<Vec<CanonicalRecord>>,
}

impl MemoryCatalog {
    pub fn new(records: Vec<CanonicalRecord>) -> Self {
        Self {
            records: Arc::new(records),
        }
    }
}

impl CatalogSource for MemoryCatalog {
    async fn fetch_all(&self) -> SyncResult<Vec<CanonicalRecord>> {
        Ok(self.records.as_ref().clone())
    }
}
