use crate::error::SyncResult;
use crate::images::{ImageProcessor, ImageRequest, StoredImages};

/// Uses the first source reference as both image and thumbnail, without storing anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughImages;

impl ImageProcessor for PassthroughImages {
    async fn process_and_store(&self, request: &ImageRequest) -> SyncResult<StoredImages> {
        let url = request
            .sources
            .iter()
            .map(|source| source.trim())
            .find(|source| !source.is_empty())
            .map(str::to_string);

        Ok(StoredImages {
            image_url: url.clone(),
            thumbnail_url: url,
        })
    }
}
