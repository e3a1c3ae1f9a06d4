//! Image collaborator used to fill missing image URLs.

mod base;
mod passthrough;

pub use base::{ImageFill, ImageProcessor, ImageRequest, StoredImages, fill_images};
pub use passthrough::PassthroughImages;
