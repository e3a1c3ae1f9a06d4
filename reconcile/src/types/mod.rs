mod key;
mod record;
pub mod vocabulary;

pub use key::DocumentKey;
pub use record::{
    CODE_FIELD, CODES_FIELD, CanonicalRecord, Document, IDENTIFIER_FIELDS, IMAGE_URL_FIELD,
    LAST_UPDATED_FIELD, LocalRecord, NON_ENTITY_FIELD, PRIMARY_CODE_FIELD, THUMBNAIL_URL_FIELD,
    is_empty_value,
};
