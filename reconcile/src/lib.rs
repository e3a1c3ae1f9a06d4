//! Incremental reconciliation of a local record store against a reference catalog.
//!
//! Local records are matched to canonical records by identifier code, compared through a
//! fingerprint of the canonical data, merged field by field under a declarative policy table
//! and written back through a batch coordinator that bounds batch size and commit concurrency.

pub mod catalog;
pub mod concurrency;
pub mod error;
pub mod failpoints;
pub mod fingerprint;
pub mod images;
pub mod indexing;
mod macros;
pub mod matching;
pub mod merge;
pub mod metrics;
pub mod reconciler;
pub mod store;
#[cfg(feature = "test-utils")]
pub mod test_utils;
pub mod types;
