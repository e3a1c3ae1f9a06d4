//! Sources of canonical records.

mod base;
mod http;
mod memory;

pub use base::{CatalogSource, parse_records};
pub use http::HttpCatalog;
pub use memory::MemoryCatalog;
