use serde::Deserialize;

use crate::shared::ValidationError;

/// How the reference catalog endpoint returns its records.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CatalogPagination {
    /// One request returns every record.
    Bulk,
    /// Records are fetched page by page until an empty page is returned.
    Paged {
        /// Query parameter carrying the page number.
        page_param: String,
        /// Query parameter carrying the page size.
        size_param: String,
        /// Number of records requested per page.
        page_size: usize,
    },
}

impl Default for CatalogPagination {
    fn default() -> Self {
        Self::Bulk
    }
}

/// Settings of the reference catalog client.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CatalogConfig {
    /// Endpoint returning the catalog as JSON.
    pub url: String,
    /// Name of the array field holding the records when the response is an object.
    #[serde(default)]
    pub records_field: Option<String>,
    /// Pagination mode of the endpoint.
    #[serde(default)]
    pub pagination: CatalogPagination,
    /// Request timeout, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl CatalogConfig {
    pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 60_000;

    /// Validates the catalog settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.trim().is_empty() {
            return Err(ValidationError::EmptyUrl("catalog.url".to_string()));
        }

        if let CatalogPagination::Paged { page_size: 0, .. } = self.pagination {
            return Err(ValidationError::InvalidFieldValue {
                field: "catalog.pagination.paged.page_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

fn default_request_timeout_ms() -> u64 {
    CatalogConfig::DEFAULT_REQUEST_TIMEOUT_MS
}
