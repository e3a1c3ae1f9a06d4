use chrono::{DateTime, SecondsFormat, Utc};
use config::shared::MergeConfig;
use serde_json::Value;
use tracing::trace;

use crate::bail;
use crate::error::{ErrorKind, SyncResult};
use crate::matching::{IdentifierMatcher, normalize_code};
use crate::merge::categories::canonical_categories;
use crate::merge::identifiers::{extension_codes, merge_identifiers};
use crate::merge::policy::{DEFAULT_FIELD_RULES, FieldRule, FieldUpdates, MergePolicy, differs, should_fill};
use crate::types::vocabulary::{element_names, numeric_value, rarity_name};
use crate::types::{
    CODE_FIELD, CODES_FIELD, CanonicalRecord, IDENTIFIER_FIELDS, IMAGE_URL_FIELD, LocalRecord,
    PRIMARY_CODE_FIELD, is_empty_value,
};

/// Computes the minimal field updates bringing a local record in line with its canonical
/// record.
///
/// Every field is handled by the [`MergePolicy`] of its row in the merge table, through one
/// generic loop. Records flagged as non-entity only get their identifier fields cleared.
#[derive(Debug, Clone)]
pub struct FieldMergeResolver {
    rules: Vec<FieldRule>,
    matcher: IdentifierMatcher,
    protected_keywords: Vec<String>,
    extension_prefixes: Vec<String>,
    primary_categories: Vec<String>,
}

impl FieldMergeResolver {
    /// Creates a resolver using the default merge table.
    ///
    /// `matcher` provides the identifier notation: code splitting and promo detection.
    pub fn new(matcher: IdentifierMatcher, config: &MergeConfig) -> Self {
        Self {
            rules: DEFAULT_FIELD_RULES.to_vec(),
            matcher,
            protected_keywords: config
                .protected_keywords
                .iter()
                .map(|keyword| keyword.trim().to_lowercase())
                .filter(|keyword| !keyword.is_empty())
                .collect(),
            extension_prefixes: config.extension_prefixes.clone(),
            primary_categories: config.primary_categories.clone(),
        }
    }

    /// Replaces the merge table.
    ///
    /// Value policies only apply to fields the canonical record provides, and the identifier
    /// policy only to the `code` field. Any other row is rejected.
    pub fn with_rules(mut self, rules: Vec<FieldRule>) -> SyncResult<Self> {
        for rule in &rules {
            let supported = match rule.policy {
                MergePolicy::FillIfEmpty
                | MergePolicy::AlwaysOverwrite
                | MergePolicy::ProtectedName => CANONICAL_FIELDS.contains(&rule.field),
                MergePolicy::CategoricalComposite => true,
                MergePolicy::IdentifierSet => rule.field == CODE_FIELD,
            };
            if !supported {
                bail!(
                    ErrorKind::ConfigError,
                    "Merge rule is not supported",
                    format!(
                        "The policy {:?} cannot be applied to the field '{}'",
                        rule.policy, rule.field
                    )
                );
            }
        }

        self.rules = rules;
        Ok(self)
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }

    /// Returns the extension codes `local` carries on top of the codes of `canonical`.
    pub fn local_extensions(&self, local: &LocalRecord, canonical: &CanonicalRecord) -> Vec<String> {
        extension_codes(
            &self.matcher.raw_local_codes(local),
            &self.matcher.canonical_codes(canonical),
            &self.extension_prefixes,
        )
    }

    /// Computes the updates for `local`, stamped with the current time.
    pub fn resolve(&self, local: &LocalRecord, canonical: &CanonicalRecord) -> FieldUpdates {
        self.resolve_at(local, canonical, Utc::now())
    }

    /// Computes the updates for `local`, stamped with `now`.
    pub fn resolve_at(
        &self,
        local: &LocalRecord,
        canonical: &CanonicalRecord,
        now: DateTime<Utc>,
    ) -> FieldUpdates {
        if local.is_non_entity() {
            return self.clear_non_entity_at(local, now);
        }

        let mut updates = FieldUpdates::new(timestamp(now));

        for rule in &self.rules {
            match rule.policy {
                MergePolicy::FillIfEmpty => {
                    if let Some(value) = canonical_value(rule.field, canonical) {
                        if should_fill(local.field(rule.field), &value) {
                            updates.insert(rule.field, value);
                        }
                    }
                }
                MergePolicy::AlwaysOverwrite => {
                    if let Some(value) = canonical_value(rule.field, canonical) {
                        if !is_empty_value(Some(&value)) && differs(local.field(rule.field), &value)
                        {
                            updates.insert(rule.field, value);
                        }
                    }
                }
                MergePolicy::ProtectedName => self.resolve_name(rule.field, local, canonical, &mut updates),
                MergePolicy::CategoricalComposite => {
                    let categories = canonical_categories(canonical, &self.primary_categories);
                    if !categories.is_empty() {
                        let value = Value::from(categories);
                        if differs(local.field(rule.field), &value) {
                            updates.insert(rule.field, value);
                        }
                    }
                }
                MergePolicy::IdentifierSet => self.resolve_identifiers(local, canonical, &mut updates),
            }
        }

        trace!(record_id = %local.id, fields = updates.len(), "record resolved");

        updates
    }

    /// Clears every identifier field of a non-entity record that is not already null.
    pub fn clear_non_entity(&self, local: &LocalRecord) -> FieldUpdates {
        self.clear_non_entity_at(local, Utc::now())
    }

    fn clear_non_entity_at(&self, local: &LocalRecord, now: DateTime<Utc>) -> FieldUpdates {
        let mut updates = FieldUpdates::new(timestamp(now));
        for field in IDENTIFIER_FIELDS {
            if matches!(local.field(field), Some(value) if !value.is_null()) {
                updates.insert(field, Value::Null);
            }
        }

        updates
    }

    /// Whether images should be requested for `local`.
    pub fn needs_images(&self, local: &LocalRecord, canonical: &CanonicalRecord) -> bool {
        !local.is_non_entity()
            && is_empty_value(local.field(IMAGE_URL_FIELD))
            && canonical.images.iter().any(|image| !image.trim().is_empty())
    }

    fn resolve_name(
        &self,
        field: &str,
        local: &LocalRecord,
        canonical: &CanonicalRecord,
        updates: &mut FieldUpdates,
    ) {
        let Some(value) = canonical_value(field, canonical) else {
            return;
        };

        let curated = local.str_field(field).is_some_and(|name| {
            let name = name.to_lowercase();
            self.protected_keywords
                .iter()
                .any(|keyword| name.contains(keyword.as_str()))
        });
        if curated || self.matcher.is_promo_coded(local) {
            return;
        }

        if differs(local.field(field), &value) {
            updates.insert(field, value);
        }
    }

    /// Promo-coded records keep their identifiers, which follow the promo notation.
    ///
    /// When the merged code set equals the codes the record already holds, only identifier
    /// fields the record carries are corrected. Absent fields are left absent.
    fn resolve_identifiers(
        &self,
        local: &LocalRecord,
        canonical: &CanonicalRecord,
        updates: &mut FieldUpdates,
    ) {
        if self.matcher.is_promo_coded(local) {
            return;
        }

        let canonical_codes = self.matcher.canonical_codes(canonical);
        let extensions = self.local_extensions(local, canonical);
        let Some(merged) = merge_identifiers(&canonical_codes, &extensions, &self.extension_prefixes)
        else {
            return;
        };

        let codes_changed =
            normalized_codes(&self.matcher.raw_local_codes(local)) != normalized_codes(&merged.codes);
        let candidates = [
            (CODE_FIELD, Value::from(merged.code)),
            (CODES_FIELD, Value::from(merged.codes)),
            (PRIMARY_CODE_FIELD, Value::from(merged.primary_code)),
        ];
        for (field, value) in candidates {
            let carried = matches!(local.field(field), Some(current) if !current.is_null());
            if (codes_changed || carried) && differs(local.field(field), &value) {
                updates.insert(field, value);
            }
        }
    }
}

/// Fields [`canonical_value`] knows how to read.
const CANONICAL_FIELDS: &[&str] = &[
    "name", "type", "job", "rarity", "cost", "power", "elements", "sets",
];

fn normalized_codes(codes: &[String]) -> Vec<String> {
    let mut codes: Vec<String> = codes
        .iter()
        .map(|code| normalize_code(code))
        .filter(|code| !code.is_empty())
        .collect();
    codes.sort();
    codes.dedup();
    codes
}

/// Returns the value a field takes from the canonical record, in local vocabulary.
fn canonical_value(field: &str, canonical: &CanonicalRecord) -> Option<Value> {
    let text = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(Value::from)
    };

    match field {
        "name" => text(&canonical.name),
        "type" => text(&canonical.kind),
        "job" => text(&canonical.job),
        "rarity" => canonical
            .rarity
            .as_deref()
            .filter(|rarity| !rarity.trim().is_empty())
            .map(|rarity| Value::from(rarity_name(rarity))),
        "cost" => canonical.cost.as_deref().and_then(numeric_value),
        "power" => canonical.power.as_deref().and_then(numeric_value),
        "elements" => Some(Value::from(element_names(&canonical.elements))),
        "sets" => {
            let mut sets: Vec<String> = Vec::new();
            for set in &canonical.sets {
                let set = set.trim();
                if !set.is_empty() && !sets.iter().any(|known| known == set) {
                    sets.push(set.to_string());
                }
            }
            Some(Value::from(sets))
        }
        _ => None,
    }
}

fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn resolver() -> FieldMergeResolver {
        FieldMergeResolver::new(IdentifierMatcher::default(), &MergeConfig::default())
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn local(value: serde_json::Value) -> LocalRecord {
        LocalRecord::new("card-1", value.as_object().unwrap().clone())
    }

    fn canonical() -> CanonicalRecord {
        CanonicalRecord {
            code: "1-001H".to_string(),
            name: Some("Cloud".to_string()),
            kind: Some("Forward".to_string()),
            job: Some("SOLDIER".to_string()),
            rarity: Some("H".to_string()),
            elements: vec!["風".to_string()],
            cost: Some("5".to_string()),
            power: Some("9000".to_string()),
            sets: vec!["Opus I".to_string()],
            category_1: Some("VII".to_string()),
            ..Default::default()
        }
    }

    fn consistent_local() -> serde_json::Value {
        json!({
            "name": "Cloud",
            "type": "Forward",
            "job": "SOLDIER",
            "rarity": "Hero",
            "elements": ["Wind"],
            "cost": 5,
            "power": 9000,
            "sets": ["Opus I"],
            "categories": ["VII"],
            "code": "1-001H",
            "codes": ["1-001H"],
            "primary_code": "1-001H",
        })
    }

    #[test]
    fn consistent_record_yields_empty_updates() {
        let updates = resolver().resolve_at(&local(consistent_local()), &canonical(), now());

        assert!(updates.is_empty(), "{updates:?}");
        assert_eq!(
            updates.get("last_updated"),
            Some(&json!("2025-03-01T12:00:00.000Z"))
        );
    }

    #[test]
    fn fill_if_empty_never_overwrites_present_values() {
        let mut data = consistent_local();
        data["type"] = json!("Backup");
        data["power"] = json!(null);
        data["elements"] = json!([]);
        data.as_object_mut().unwrap().remove("job");

        let updates = resolver().resolve_at(&local(data), &canonical(), now());

        assert!(!updates.contains("type"));
        assert_eq!(updates.get("power"), Some(&json!(9000)));
        assert_eq!(updates.get("elements"), Some(&json!(["Wind"])));
        assert_eq!(updates.get("job"), Some(&json!("SOLDIER")));
        assert_eq!(updates.len(), 3);
    }

    #[test]
    fn custom_table_replaces_the_default_rules() {
        let resolver = resolver()
            .with_rules(vec![FieldRule::new("type", MergePolicy::AlwaysOverwrite)])
            .unwrap();
        assert_eq!(resolver.rules().len(), 1);

        let mut data = consistent_local();
        data["type"] = json!("Backup");
        data["power"] = json!(null);

        let updates = resolver.resolve_at(&local(data), &canonical(), now());

        assert_eq!(updates.get("type"), Some(&json!("Forward")));
        assert_eq!(updates.len(), 1);
    }

    #[test]
    fn rules_for_unknown_fields_are_rejected() {
        let err = resolver()
            .with_rules(vec![FieldRule::new("flavor_text", MergePolicy::FillIfEmpty)])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);

        let err = resolver()
            .with_rules(vec![FieldRule::new("codes", MergePolicy::IdentifierSet)])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);

        let resolver = resolver()
            .with_rules(vec![FieldRule::new("tags", MergePolicy::CategoricalComposite)])
            .unwrap();
        let updates = resolver.resolve_at(&local(consistent_local()), &canonical(), now());
        assert_eq!(updates.get("tags"), Some(&json!(["VII"])));
    }

    #[test]
    fn sets_are_overwritten_when_they_diverge() {
        let mut data = consistent_local();
        data["sets"] = json!(["Opus II"]);

        let updates = resolver().resolve_at(&local(data), &canonical(), now());

        assert_eq!(updates.get("sets"), Some(&json!(["Opus I"])));
    }

    #[test]
    fn protected_names_are_kept() {
        let mut data = consistent_local();
        data["name"] = json!("Cloud (Anniversary Promo)");
        let updates = resolver().resolve_at(&local(data), &canonical(), now());
        assert!(!updates.contains("name"));

        let mut data = consistent_local();
        data["name"] = json!("Cloud Strife");
        let updates = resolver().resolve_at(&local(data), &canonical(), now());
        assert_eq!(updates.get("name"), Some(&json!("Cloud")));
    }

    #[test]
    fn promo_coded_records_keep_name_and_identifiers() {
        let mut data = consistent_local();
        data["name"] = json!("Cloud Strife");
        data["code"] = json!("PR-001/1-001H");
        data["codes"] = json!(["PR-001/1-001H"]);
        data["primary_code"] = json!("PR-001/1-001H");

        let updates = resolver().resolve_at(&local(data), &canonical(), now());

        assert!(updates.is_empty(), "{updates:?}");
    }

    #[test]
    fn categories_compare_without_order() {
        let mut canonical = canonical();
        canonical.category_1 = Some("DFF·VII".to_string());

        let mut data = consistent_local();
        data["categories"] = json!(["DFF", "VII"]);
        let updates = resolver().resolve_at(&local(data), &canonical, now());
        assert!(!updates.contains("categories"));

        let updates = resolver().resolve_at(&local(consistent_local()), &canonical, now());
        assert_eq!(updates.get("categories"), Some(&json!(["VII", "DFF"])));
    }

    #[test]
    fn identifiers_keep_local_extension_codes() {
        let mut data = consistent_local();
        data["codes"] = json!(["1-001H", "Re-077H"]);

        let updates = resolver().resolve_at(&local(data), &canonical(), now());

        assert_eq!(updates.get("code"), Some(&json!("1-001H/Re-077H")));
        assert!(!updates.contains("codes"));
        assert!(!updates.contains("primary_code"));
    }

    #[test]
    fn absent_identifier_fields_stay_absent_when_codes_agree() {
        let data = json!({
            "codes": ["1-001H"],
            "power": null,
            "rarity": null,
        });
        let canonical = CanonicalRecord {
            code: "1-001H".to_string(),
            power: Some("7000".to_string()),
            rarity: Some("C".to_string()),
            ..Default::default()
        };

        let updates = resolver().resolve_at(&local(data), &canonical, now());

        assert_eq!(updates.get("power"), Some(&json!(7000)));
        assert_eq!(updates.get("rarity"), Some(&json!("Common")));
        assert_eq!(updates.len(), 2, "{updates:?}");
    }

    #[test]
    fn identifiers_are_written_when_the_code_set_changes() {
        let data = json!({"codes": ["1-001h"], "primary_code": "1-001H"});
        let mut canonical = canonical();
        canonical.code = "1-001H/Re-001H".to_string();

        let updates = resolver().resolve_at(&local(data), &canonical, now());

        assert_eq!(updates.get("code"), Some(&json!("1-001H/Re-001H")));
        assert_eq!(updates.get("codes"), Some(&json!(["1-001H", "Re-001H"])));
        assert!(!updates.contains("primary_code"));
    }

    #[test]
    fn non_entity_records_only_clear_present_identifiers() {
        let data = json!({
            "non_entity": true,
            "name": "Rules insert",
            "code": "1-001H",
            "codes": null,
            "power": null,
        });

        let updates = resolver().resolve_at(&local(data), &canonical(), now());

        assert_eq!(updates.len(), 1);
        assert_eq!(updates.get("code"), Some(&json!(null)));
        assert!(!updates.contains("codes"));
        assert!(!updates.contains("primary_code"));
    }

    #[test]
    fn images_are_needed_only_for_entities_without_image() {
        let resolver = resolver();
        let mut with_images = canonical();
        with_images.images = vec!["https://img.example.com/1-001H.jpg".to_string()];

        assert!(resolver.needs_images(&local(consistent_local()), &with_images));

        let mut data = consistent_local();
        data["image_url"] = json!("images/1-001H.jpg");
        assert!(!resolver.needs_images(&local(data), &with_images));

        assert!(!resolver.needs_images(&local(json!({"non_entity": true})), &with_images));
        assert!(!resolver.needs_images(&local(consistent_local()), &canonical()));
    }
}
