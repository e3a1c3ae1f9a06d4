use serde_json::{Map, Value};

use crate::types::{LAST_UPDATED_FIELD, is_empty_value};

/// How a canonical value is merged into a local field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Written only when the local value is missing, null, blank or an empty list.
    FillIfEmpty,
    /// Written whenever it differs from the local value.
    AlwaysOverwrite,
    /// The display name; kept when the local name is curated or the record is promo coded.
    ProtectedName,
    /// A category list built from composite category fields, compared ignoring order.
    CategoricalComposite,
    /// The identifier codes; canonical codes are merged with local extension codes.
    IdentifierSet,
}

/// One row of the merge table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRule {
    pub field: &'static str,
    pub policy: MergePolicy,
}

impl FieldRule {
    pub const fn new(field: &'static str, policy: MergePolicy) -> Self {
        Self { field, policy }
    }
}

/// Default merge table.
///
/// The `code` row covers the `code`, `codes` and `primary_code` fields.
pub const DEFAULT_FIELD_RULES: &[FieldRule] = &[
    FieldRule::new("name", MergePolicy::ProtectedName),
    FieldRule::new("type", MergePolicy::FillIfEmpty),
    FieldRule::new("job", MergePolicy::FillIfEmpty),
    FieldRule::new("cost", MergePolicy::FillIfEmpty),
    FieldRule::new("power", MergePolicy::FillIfEmpty),
    FieldRule::new("rarity", MergePolicy::FillIfEmpty),
    FieldRule::new("elements", MergePolicy::FillIfEmpty),
    FieldRule::new("sets", MergePolicy::AlwaysOverwrite),
    FieldRule::new("categories", MergePolicy::CategoricalComposite),
    FieldRule::new("code", MergePolicy::IdentifierSet),
];

/// Field updates for one local record.
///
/// Always carries the write timestamp; the updates are empty when nothing else is present.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdates {
    fields: Map<String, Value>,
}

impl FieldUpdates {
    /// Creates updates holding only the `last_updated` timestamp.
    pub fn new(timestamp: impl Into<Value>) -> Self {
        let mut fields = Map::new();
        fields.insert(LAST_UPDATED_FIELD.to_string(), timestamp.into());

        Self { fields }
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Whether no field besides the timestamp is updated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of updated fields, the timestamp excluded.
    pub fn len(&self) -> usize {
        self.fields
            .keys()
            .filter(|field| field.as_str() != LAST_UPDATED_FIELD)
            .count()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }
}

/// Whether `canonical` should replace `local` under [`MergePolicy::FillIfEmpty`].
pub(crate) fn should_fill(local: Option<&Value>, canonical: &Value) -> bool {
    is_empty_value(local) && !is_empty_value(Some(canonical))
}

/// Whether two values differ once string lists are compared without order.
pub(crate) fn differs(local: Option<&Value>, canonical: &Value) -> bool {
    match (local, canonical) {
        (Some(Value::Array(local)), Value::Array(canonical)) => {
            normalized_list(local) != normalized_list(canonical)
        }
        (Some(Value::String(local)), Value::String(canonical)) => local.trim() != canonical.trim(),
        (Some(local), canonical) => local != canonical,
        (None, canonical) => !canonical.is_null(),
    }
}

fn normalized_list(values: &[Value]) -> Vec<String> {
    let mut values: Vec<String> = values
        .iter()
        .map(|value| match value {
            Value::String(text) => text.trim().to_string(),
            other => other.to_string(),
        })
        .collect();
    values.sort();
    values.dedup();
    values
}
