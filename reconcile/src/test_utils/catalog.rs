use crate::bail;
use crate::catalog::CatalogSource;
use crate::error::{ErrorKind, SyncResult};
use crate::types::CanonicalRecord;

/// Catalog whose every fetch fails with [`ErrorKind::CatalogRequestFailed`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingCatalog;

impl CatalogSource for FailingCatalog {
    async fn fetch_all(&self) -> SyncResult<Vec<CanonicalRecord>> {
        bail!(
            ErrorKind::CatalogRequestFailed,
            "Catalog request failed",
            "Injected catalog outage"
        )
    }
}
