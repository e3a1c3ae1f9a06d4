use serde::Deserialize;

use crate::shared::ValidationError;

/// Settings of one reconciliation run.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReconcilerConfig {
    /// Collection holding the local records.
    #[serde(default = "default_records_collection")]
    pub records_collection: String,
    /// Collection holding one fingerprint per canonical identifier.
    #[serde(default = "default_fingerprints_collection")]
    pub fingerprints_collection: String,
    /// Collection holding the search-term index.
    #[serde(default = "default_index_collection")]
    pub index_collection: String,
    /// Number of local records read per page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Computes and counts updates without writing them.
    #[serde(default)]
    pub dry_run: bool,
    /// Whether the search-term index pass runs after reconciliation.
    #[serde(default = "default_build_search_index")]
    pub build_search_index: bool,
    /// Identifier matching settings.
    #[serde(default)]
    pub matching: MatchingConfig,
    /// Field merge settings.
    #[serde(default)]
    pub merge: MergeConfig,
}

impl ReconcilerConfig {
    pub const DEFAULT_RECORDS_COLLECTION: &'static str = "cards";
    pub const DEFAULT_FINGERPRINTS_COLLECTION: &'static str = "sync_fingerprints";
    pub const DEFAULT_INDEX_COLLECTION: &'static str = "search_index";
    pub const DEFAULT_PAGE_SIZE: usize = 500;

    /// Validates the reconciliation settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.page_size == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "reconciler.page_size".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        let collections = [
            ("reconciler.records_collection", &self.records_collection),
            ("reconciler.fingerprints_collection", &self.fingerprints_collection),
            ("reconciler.index_collection", &self.index_collection),
        ];
        for (field, collection) in collections {
            if collection.trim().is_empty() {
                return Err(ValidationError::InvalidFieldValue {
                    field: field.to_string(),
                    constraint: "must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            records_collection: default_records_collection(),
            fingerprints_collection: default_fingerprints_collection(),
            index_collection: default_index_collection(),
            page_size: default_page_size(),
            dry_run: false,
            build_search_index: default_build_search_index(),
            matching: MatchingConfig::default(),
            merge: MergeConfig::default(),
        }
    }
}

/// Settings of the identifier matcher.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MatchingConfig {
    /// Patterns recognizing a promo prefix at the start of a code, including its `/`.
    #[serde(default = "default_promo_patterns")]
    pub promo_patterns: Vec<String>,
    /// Requires intersecting set lists when both records carry sets.
    #[serde(default = "default_use_set_discriminator")]
    pub use_set_discriminator: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            promo_patterns: default_promo_patterns(),
            use_set_discriminator: default_use_set_discriminator(),
        }
    }
}

/// Settings of the field merge resolver.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MergeConfig {
    /// Keywords marking a local name as curated; such names are never overwritten.
    #[serde(default = "default_protected_keywords")]
    pub protected_keywords: Vec<String>,
    /// Prefixes of identifier codes contributed by other sources, e.g. reprints.
    #[serde(default = "default_extension_prefixes")]
    pub extension_prefixes: Vec<String>,
    /// Categories ordered before every other category.
    #[serde(default = "default_primary_categories")]
    pub primary_categories: Vec<String>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            protected_keywords: default_protected_keywords(),
            extension_prefixes: default_extension_prefixes(),
            primary_categories: default_primary_categories(),
        }
    }
}

fn default_records_collection() -> String {
    ReconcilerConfig::DEFAULT_RECORDS_COLLECTION.to_string()
}

fn default_fingerprints_collection() -> String {
    ReconcilerConfig::DEFAULT_FINGERPRINTS_COLLECTION.to_string()
}

fn default_index_collection() -> String {
    ReconcilerConfig::DEFAULT_INDEX_COLLECTION.to_string()
}

fn default_page_size() -> usize {
    ReconcilerConfig::DEFAULT_PAGE_SIZE
}

fn default_build_search_index() -> bool {
    true
}

fn default_promo_patterns() -> Vec<String> {
    vec![r"^PR-?\d+/".to_string()]
}

fn default_use_set_discriminator() -> bool {
    true
}

fn default_protected_keywords() -> Vec<String> {
    ["promo", "anniversary", "full art", "prerelease"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_extension_prefixes() -> Vec<String> {
    vec!["Re-".to_string()]
}

fn default_primary_categories() -> Vec<String> {
    [
        "I", "II", "III", "IV", "V", "VI", "VII", "VIII", "IX", "X", "XI", "XII", "XIII", "XIV",
        "XV", "XVI",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}
