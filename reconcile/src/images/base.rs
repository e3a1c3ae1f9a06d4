use std::future::Future;

use serde_json::Value;
use tracing::warn;

use crate::error::SyncResult;
use crate::types::{Document, IMAGE_URL_FIELD, THUMBNAIL_URL_FIELD};

/// Images to produce for one local record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub record_id: String,
    /// Canonical code the images belong to.
    pub code: String,
    /// Source references offered by the canonical record.
    pub sources: Vec<String>,
}

/// References of the stored images.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredImages {
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// Service that fetches, transforms and stores images.
pub trait ImageProcessor {
    fn process_and_store(
        &self,
        request: &ImageRequest,
    ) -> impl Future<Output = SyncResult<StoredImages>> + Send;
}

/// Image fields to write on a local record.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFill {
    pub fields: Document,
    /// Whether the placeholder was written in place of a processed image.
    pub failed: bool,
}

/// Requests images for `request` and returns the fields to write.
///
/// A failed request, or one that yields no image URL, writes `placeholder` to both fields. A
/// missing thumbnail falls back to the image URL.
pub async fn fill_images<P>(processor: &P, request: &ImageRequest, placeholder: &str) -> ImageFill
where
    P: ImageProcessor,
{
    let stored = match processor.process_and_store(request).await {
        Ok(stored) => stored,
        Err(err) => {
            warn!(
                record_id = %request.record_id,
                code = %request.code,
                error = %err,
                "image processing failed, writing placeholder"
            );
            StoredImages::default()
        }
    };

    let non_blank = |url: Option<String>| url.filter(|url| !url.trim().is_empty());
    let (image_url, failed) = match non_blank(stored.image_url) {
        Some(url) => (url, false),
        None => (placeholder.to_string(), true),
    };
    let thumbnail_url = non_blank(stored.thumbnail_url)
        .filter(|_| !failed)
        .unwrap_or_else(|| image_url.clone());

    let mut fields = Document::new();
    fields.insert(IMAGE_URL_FIELD.to_string(), Value::from(image_url));
    fields.insert(THUMBNAIL_URL_FIELD.to_string(), Value::from(thumbnail_url));

    ImageFill { fields, failed }
}
