use serde::Deserialize;

/// Settings of the image collaborator used to fill missing image URLs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ImageConfig {
    /// Whether missing image URLs are filled at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Reference written when an image cannot be produced.
    #[serde(default = "default_placeholder_url")]
    pub placeholder_url: String,
    /// Number of image requests processed concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl ImageConfig {
    pub const DEFAULT_PLACEHOLDER_URL: &'static str = "images/placeholder.jpg";
    pub const DEFAULT_CONCURRENCY: usize = 8;
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            placeholder_url: default_placeholder_url(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_placeholder_url() -> String {
    ImageConfig::DEFAULT_PLACEHOLDER_URL.to_string()
}

fn default_concurrency() -> usize {
    ImageConfig::DEFAULT_CONCURRENCY
}
