//! Test doubles and fixtures for reconciliation tests.
//!
//! - [`store`] wraps [`crate::store::memory::MemoryStore`] with scripted commit faults, commit
//!   latency and a gauge of concurrent commits.
//! - [`images`] records image requests and fails on selected codes.
//! - [`catalog`] provides a catalog that always fails.
//! - [`records`] builds canonical and local records and seeds stores.

pub mod catalog;
pub mod images;
pub mod records;
pub mod store;
