//! Change detection for canonical records.
//!
//! A fingerprint is a digest of the parts of a canonical record that end up on a local record.
//! It is stored per canonical code together with the ids of the local records it was applied
//! to, so a repeat run can skip every such record whose canonical data and local extension codes
//! did not change.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::SyncResult;
use crate::types::vocabulary::{element_names, numeric_value, rarity_name};
use crate::types::{CanonicalRecord, Document};

/// Number of digest bytes kept in a fingerprint.
const FINGERPRINT_BYTES: usize = 16;

/// Field of a fingerprint document holding the digest.
pub const FINGERPRINT_FIELD: &str = "fingerprint";

/// Field of a fingerprint document listing the local record ids the digest was applied to.
pub const RECORD_IDS_FIELD: &str = "record_ids";

/// A 128-bit digest rendered as 32 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads the digest stored in a fingerprint document.
    pub fn from_document(document: &Document) -> Option<Fingerprint> {
        document
            .get(FINGERPRINT_FIELD)
            .and_then(Value::as_str)
            .filter(|digest| {
                digest.len() == FINGERPRINT_BYTES * 2
                    && digest.chars().all(|c| c.is_ascii_hexdigit())
            })
            .map(|digest| Fingerprint(digest.to_ascii_lowercase()))
    }
}

/// Fingerprint document read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFingerprint {
    pub fingerprint: Fingerprint,
    /// Sorted ids of the records the fingerprint was applied to.
    pub record_ids: Vec<String>,
}

impl StoredFingerprint {
    /// Reads a fingerprint document. Returns [`None`] when the digest is missing or malformed.
    ///
    /// Documents without a record id list cover no record.
    pub fn from_document(document: &Document) -> Option<StoredFingerprint> {
        let fingerprint = Fingerprint::from_document(document)?;
        let mut record_ids: Vec<String> = document
            .get(RECORD_IDS_FIELD)
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        record_ids.sort();
        record_ids.dedup();

        Some(StoredFingerprint {
            fingerprint,
            record_ids,
        })
    }

    /// Whether `record_id` was brought in line with `fingerprint`.
    pub fn covers(&self, fingerprint: &Fingerprint, record_id: &str) -> bool {
        self.fingerprint == *fingerprint
            && self.record_ids.binary_search_by(|id| id.as_str().cmp(record_id)).is_ok()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalized view of a canonical record. Field order is fixed by the declaration.
#[derive(Debug, Serialize)]
struct Projection {
    codes: Vec<String>,
    name: Option<String>,
    kind: Option<String>,
    job: Option<String>,
    rarity: Option<String>,
    elements: Vec<String>,
    categories: Vec<String>,
    cost: Option<Value>,
    power: Option<Value>,
    sets: Vec<String>,
    has_images: bool,
}

/// Computes the fingerprint of `canonical` together with the extension codes carried by the
/// local record it is matched to.
///
/// `canonical_codes` are the codes of the canonical composite. The result does not depend on
/// the order of any list.
pub fn fingerprint(
    canonical: &CanonicalRecord,
    canonical_codes: &[String],
    local_extensions: &[String],
) -> SyncResult<Fingerprint> {
    let projection = project(canonical, canonical_codes, local_extensions);
    let bytes = serde_json::to_vec(&projection)?;
    let digest = Sha256::digest(&bytes);

    let hex = digest[..FINGERPRINT_BYTES]
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect();

    Ok(Fingerprint(hex))
}

/// Returns the document id of the fingerprint of a canonical code.
///
/// `/`, `.`, `#` and whitespace are replaced by `_` so the id is a single path segment.
pub fn fingerprint_key(canonical_code: &str) -> String {
    canonical_code
        .trim()
        .chars()
        .map(|c| {
            if c == '/' || c == '.' || c == '#' || c.is_whitespace() {
                '_'
            } else {
                c
            }
        })
        .collect()
}

fn project(
    canonical: &CanonicalRecord,
    canonical_codes: &[String],
    local_extensions: &[String],
) -> Projection {
    let codes = sorted_unique(canonical_codes.iter().chain(local_extensions));

    let mut categories: Vec<String> = [&canonical.category_1, &canonical.category_2]
        .into_iter()
        .flatten()
        .map(|category| category.trim().to_string())
        .filter(|category| !category.is_empty())
        .collect();
    categories.sort();
    categories.dedup();

    Projection {
        codes,
        name: trimmed(&canonical.name),
        kind: trimmed(&canonical.kind),
        job: trimmed(&canonical.job),
        rarity: trimmed(&canonical.rarity).map(|rarity| rarity_name(&rarity)),
        elements: element_names(&canonical.elements),
        categories,
        cost: canonical.cost.as_deref().and_then(numeric_value),
        power: canonical.power.as_deref().and_then(numeric_value),
        sets: sorted_unique(&canonical.sets),
        has_images: canonical.images.iter().any(|image| !image.trim().is_empty()),
    }
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn sorted_unique<'a>(values: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut values: Vec<String> = values
        .into_iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect();
    values.sort();
    values.dedup();
    values
}
