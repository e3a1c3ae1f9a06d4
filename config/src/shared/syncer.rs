use serde::Deserialize;

use crate::Config;
use crate::shared::{
    CatalogConfig, ImageConfig, ReconcilerConfig, StoreConfig, ValidationError, WriteBatchConfig,
};

/// Top-level configuration of the `syncer` binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncerConfig {
    /// Document store receiving the updates.
    #[serde(default)]
    pub store: StoreConfig,
    /// Reference catalog client.
    pub catalog: CatalogConfig,
    /// Image collaborator.
    #[serde(default)]
    pub images: ImageConfig,
    /// Batch write coordinator.
    #[serde(default)]
    pub batch: WriteBatchConfig,
    /// Reconciliation behavior.
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

impl SyncerConfig {
    /// Validates every section.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.store.validate()?;
        self.catalog.validate()?;
        self.batch.validate()?;
        self.reconciler.validate()?;

        Ok(())
    }
}

impl Config for SyncerConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[
        "reconciler.matching.promo_patterns",
        "reconciler.merge.protected_keywords",
        "reconciler.merge.extension_prefixes",
        "reconciler.merge.primary_categories",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_configuration_uses_defaults() {
        let config: SyncerConfig = serde_json::from_str(
            r#"{"catalog": {"url": "https://catalog.example.com/cards"}}"#,
        )
        .unwrap();

        assert!(matches!(config.store, StoreConfig::Memory { snapshot_path: None }));
        assert_eq!(config.batch, WriteBatchConfig::default());
        assert_eq!(config.reconciler.records_collection, "cards");
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn empty_catalog_url_is_rejected() {
        let config: SyncerConfig =
            serde_json::from_str(r#"{"catalog": {"url": " "}}"#).unwrap();

        assert_eq!(
            config.validate(),
            Err(ValidationError::EmptyUrl("catalog.url".to_string()))
        );
    }
}
