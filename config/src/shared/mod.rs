//! Configuration types shared by the sync library and binary.

mod base;
mod batch;
mod catalog;
mod connection;
mod images;
mod reconciler;
mod store;
mod syncer;

pub use base::ValidationError;
pub use batch::WriteBatchConfig;
pub use catalog::{CatalogConfig, CatalogPagination};
pub use connection::{IntoConnectOptions, PgConnectionConfig, TlsConfig};
pub use images::ImageConfig;
pub use reconciler::{MatchingConfig, MergeConfig, ReconcilerConfig};
pub use store::StoreConfig;
pub use syncer::SyncerConfig;
