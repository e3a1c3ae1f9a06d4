//! Field-level merge of canonical data into local records.

mod categories;
mod identifiers;
mod policy;
mod resolver;

pub use categories::canonical_categories;
pub use identifiers::{IdentifierSet, extension_codes, merge_identifiers};
pub use policy::{DEFAULT_FIELD_RULES, FieldRule, FieldUpdates, MergePolicy};
pub use resolver::FieldMergeResolver;
