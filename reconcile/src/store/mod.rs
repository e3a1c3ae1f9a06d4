mod base;
mod batch;
pub mod memory;
pub mod postgres;

pub use base::{DocumentStore, Filter, Order, Query, load_collection};
pub use batch::{Mutation, SetOptions, WriteBatch, WriteOperation};
