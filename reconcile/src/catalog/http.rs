use std::time::Duration;

use config::shared::{CatalogConfig, CatalogPagination};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::catalog::{CatalogSource, parse_records};
use crate::error::{ErrorKind, SyncResult};
use crate::types::CanonicalRecord;
use crate::{bail, sync_error};

/// Upper bound on the pages read from a paginated catalog.
const MAX_PAGES: usize = 10_000;

/// Catalog read from a JSON endpoint over HTTP.
///
/// In paged mode pages are requested from 1 until a page comes back empty or shorter than the
/// page size, and the records of every page are concatenated.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    client: reqwest::Client,
    config: CatalogConfig,
}

impl HttpCatalog {
    pub fn new(config: CatalogConfig) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self { client, config })
    }

    async fn fetch_body(&self, query: &[(&str, String)]) -> SyncResult<Value> {
        let response = self
            .client
            .get(&self.config.url)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read body>".to_string());
            error!(status = %status, url = %self.config.url, "catalog request failed");

            bail!(
                ErrorKind::CatalogRequestFailed,
                "Catalog returned an error status",
                format!("Status {status}: {body}")
            );
        }

        response.json::<Value>().await.map_err(|err| {
            sync_error!(
                ErrorKind::CatalogInvalidResponse,
                "Catalog response is not valid JSON",
                source: err
            )
        })
    }

    async fn fetch_pages(
        &self,
        page_param: &str,
        size_param: &str,
        page_size: usize,
    ) -> SyncResult<Vec<CanonicalRecord>> {
        let records_field = self.config.records_field.as_deref();
        let mut records = Vec::new();

        for page in 1..=MAX_PAGES {
            let query = [(page_param, page.to_string()), (size_param, page_size.to_string())];
            let body = self.fetch_body(&query).await?;
            let page_records = parse_records(body, records_field)?;
            let page_len = page_records.len();
            debug!(page, records = page_len, "catalog page fetched");

            records.extend(page_records);
            if page_len < page_size {
                return Ok(records);
            }
        }

        bail!(
            ErrorKind::CatalogInvalidResponse,
            "Catalog pagination did not terminate",
            format!("More than {MAX_PAGES} full pages were returned")
        )
    }
}

impl CatalogSource for HttpCatalog {
    async fn fetch_all(&self) -> SyncResult<Vec<CanonicalRecord>> {
        let records = match &self.config.pagination {
            CatalogPagination::Bulk => {
                let body = self.fetch_body(&[]).await?;
                parse_records(body, self.config.records_field.as_deref())?
            }
            CatalogPagination::Paged {
                page_param,
                size_param,
                page_size,
            } => {
                self.fetch_pages(page_param, size_param, (*page_size).max(1))
                    .await?
            }
        };

        info!(records = records.len(), url = %self.config.url, "catalog fetched");

        Ok(records)
    }
}
