use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::images::{ImageProcessor, ImageRequest, StoredImages};

/// Image processor that records requests and stores every image under `images/{code}.jpg`.
#[derive(Debug, Clone, Default)]
pub struct RecordingImages {
    failing_codes: Arc<HashSet<String>>,
    requests: Arc<Mutex<Vec<ImageRequest>>>,
}

impl RecordingImages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes requests for the given canonical codes fail.
    pub fn failing_on<I, T>(codes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            failing_codes: Arc::new(codes.into_iter().map(Into::into).collect()),
            requests: Arc::default(),
        }
    }

    pub async fn requests(&self) -> Vec<ImageRequest> {
        self.requests.lock().await.clone()
    }
}

impl ImageProcessor for RecordingImages {
    async fn process_and_store(&self, request: &ImageRequest) -> SyncResult<StoredImages> {
        self.requests.lock().await.push(request.clone());

        if self.failing_codes.contains(&request.code) {
            bail!(
                ErrorKind::ImageProcessingFailed,
                "Image processing failed",
                format!("Injected failure for code {}", request.code)
            );
        }

        Ok(StoredImages {
            image_url: Some(format!("images/{}.jpg", request.code)),
            thumbnail_url: Some(format!("thumbnails/{}.jpg", request.code)),
        })
    }
}
