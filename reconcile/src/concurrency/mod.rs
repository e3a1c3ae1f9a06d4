pub mod commit;
pub mod coordinator;
pub mod policy;
pub mod unit;

pub use coordinator::{BatchWriteCoordinator, FlushReport};
