use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Raw JSON body of a document.
pub type Document = Map<String, Value>;

/// Composite display form of the identifier codes, e.g. `"1-001H/Re-001H"`.
pub const CODE_FIELD: &str = "code";
/// List form of the identifier codes.
pub const CODES_FIELD: &str = "codes";
/// Preferred identifier code.
pub const PRIMARY_CODE_FIELD: &str = "primary_code";
/// Timestamp written with every update.
pub const LAST_UPDATED_FIELD: &str = "last_updated";
/// Marks records that do not describe a catalog entity and never carry identifier codes.
pub const NON_ENTITY_FIELD: &str = "non_entity";
pub const IMAGE_URL_FIELD: &str = "image_url";
pub const THUMBNAIL_URL_FIELD: &str = "thumbnail_url";

/// Fields holding identifier codes on a local record.
pub const IDENTIFIER_FIELDS: [&str; 3] = [CODE_FIELD, CODES_FIELD, PRIMARY_CODE_FIELD];

/// A record of the reference catalog. Immutable once fetched.
///
/// Cost and power are kept as the raw text of the source, which may send them as strings or
/// numbers. Element and set lists accept a single string as well.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Identifier code, possibly several codes joined by `/`.
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub job: Option<String>,
    /// Rarity code, e.g. `"C"`.
    #[serde(default)]
    pub rarity: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub elements: Vec<String>,
    #[serde(default)]
    pub category_1: Option<String>,
    #[serde(default)]
    pub category_2: Option<String>,
    #[serde(default, deserialize_with = "raw_text")]
    pub cost: Option<String>,
    #[serde(default, deserialize_with = "raw_text")]
    pub power: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub sets: Vec<String>,
    /// Source references of the record's images.
    #[serde(default, deserialize_with = "string_list")]
    pub images: Vec<String>,
}

/// A record of the local store together with its document id.
///
/// Local records are loosely typed: any field may be missing, null or stale, so the record
/// keeps its JSON body and exposes typed views over it.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalRecord {
    pub id: String,
    pub data: Document,
}

impl LocalRecord {
    pub fn new(id: impl Into<String>, data: Document) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Returns the raw value of `field`, if present.
    pub fn field(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Returns `field` when it holds a string.
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }

    /// Returns the strings held by `field`, which may be an array or a single string.
    pub fn string_list(&self, field: &str) -> Vec<String> {
        match self.data.get(field) {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(value)) if !value.trim().is_empty() => vec![value.clone()],
            _ => Vec::new(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    pub fn code(&self) -> Option<&str> {
        self.str_field(CODE_FIELD)
    }

    pub fn codes(&self) -> Vec<String> {
        self.string_list(CODES_FIELD)
    }

    pub fn primary_code(&self) -> Option<&str> {
        self.str_field(PRIMARY_CODE_FIELD)
    }

    pub fn sets(&self) -> Vec<String> {
        self.string_list("sets")
    }

    /// Whether the record is flagged as not describing a catalog entity.
    pub fn is_non_entity(&self) -> bool {
        matches!(self.data.get(NON_ENTITY_FIELD), Some(Value::Bool(true)))
    }

    /// Returns a copy of this record with `updates` applied on top of its fields.
    pub fn with_updates(&self, updates: &Document) -> LocalRecord {
        let mut data = self.data.clone();
        for (field, value) in updates {
            data.insert(field.clone(), value.clone());
        }

        LocalRecord::new(self.id.clone(), data)
    }
}

/// Whether a JSON value counts as empty: missing, null, blank string or empty array.
pub fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(Value::Array(values)) => values.is_empty(),
        Some(_) => false,
    }
}

fn raw_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;

    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;

    Ok(match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(text)) => vec![text],
        Some(Value::Array(values)) => values
            .into_iter()
            .filter_map(|value| match value {
                Value::String(text) => Some(text),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(other) => vec![other.to_string()],
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn canonical_record_accepts_loose_source_types() {
        let record: CanonicalRecord = serde_json::from_value(json!({
            "code": "1-001H",
            "type": "Forward",
            "cost": 3,
            "power": "7000",
            "elements": "火",
            "sets": ["Opus I"],
        }))
        .unwrap();

        assert_eq!(record.kind.as_deref(), Some("Forward"));
        assert_eq!(record.cost.as_deref(), Some("3"));
        assert_eq!(record.power.as_deref(), Some("7000"));
        assert_eq!(record.elements, vec!["火"]);
        assert!(record.images.is_empty());
    }

    #[test]
    fn local_views_tolerate_missing_and_mistyped_fields() {
        let record = LocalRecord::new(
            "card-1",
            json!({"codes": "1-001H", "name": 12, "non_entity": "yes"})
                .as_object()
                .unwrap()
                .clone(),
        );

        assert_eq!(record.codes(), vec!["1-001H"]);
        assert_eq!(record.name(), None);
        assert_eq!(record.code(), None);
        assert!(!record.is_non_entity());
    }

    #[test]
    fn emptiness_covers_null_blank_and_empty_arrays() {
        assert!(is_empty_value(None));
        assert!(is_empty_value(Some(&Value::Null)));
        assert!(is_empty_value(Some(&json!("  "))));
        assert!(is_empty_value(Some(&json!([]))));
        assert!(!is_empty_value(Some(&json!(0))));
        assert!(!is_empty_value(Some(&json!(false))));
    }
}
