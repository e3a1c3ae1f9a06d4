//! Search-term index derived from reconciled records.

mod pass;
mod search_terms;

pub use pass::{INDEX_TERMS_FIELD, IndexReport, index_records};
pub use search_terms::search_terms;
