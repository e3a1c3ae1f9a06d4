//! Decides whether a local record and a canonical record describe the same entity.

mod codes;
mod index;

use config::shared::MatchingConfig;

pub use codes::{CODE_SEPARATOR, PromoPatterns, normalize_code};
pub use index::CanonicalIndex;

use crate::error::SyncResult;
use crate::types::{CanonicalRecord, LocalRecord};

/// A local code prepared for comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LocalCode {
    /// Normalized code.
    Plain(String),
    /// Normalized suffix of a promo-coded identifier.
    Promo(String),
}

/// Matches local records to canonical records by identifier code.
///
/// Local codes come from `code`, `codes` and `primary_code`; canonical codes from the
/// `/`-separated composite. A pair matches when any local code equals any canonical code after
/// normalization. A promo-coded local code is compared through its suffix, and a promo-coded
/// canonical code is reduced to its suffix only when compared with a promo-coded local code, so
/// `"PR-001/1-001H"` matches `"1-001H"` while `"1-001H"` does not match `"PR-002/1-001H"`.
///
/// When enabled, the set discriminator additionally requires the set lists of both records to
/// intersect if both are present.
#[derive(Debug, Clone)]
pub struct IdentifierMatcher {
    promo: PromoPatterns,
    use_set_discriminator: bool,
}

impl IdentifierMatcher {
    pub fn new(promo: PromoPatterns, use_set_discriminator: bool) -> Self {
        Self {
            promo,
            use_set_discriminator,
        }
    }

    /// Builds a matcher from its configuration, compiling the promo patterns.
    pub fn from_config(config: &MatchingConfig) -> SyncResult<Self> {
        let promo = PromoPatterns::new(&config.promo_patterns)?;

        Ok(Self::new(promo, config.use_set_discriminator))
    }

    pub fn promo_patterns(&self) -> &PromoPatterns {
        &self.promo
    }

    /// Whether `local` and `canonical` refer to the same entity.
    pub fn matches(&self, local: &LocalRecord, canonical: &CanonicalRecord) -> bool {
        let local_codes = self.local_codes(local);
        let codes_match = self
            .canonical_codes(canonical)
            .iter()
            .any(|canonical_code| {
                local_codes
                    .iter()
                    .any(|local_code| self.code_matches(local_code, canonical_code))
            });

        codes_match && self.sets_compatible(local, canonical)
    }

    /// Returns the first canonical record, in iteration order, that matches `local`.
    ///
    /// Several canonical records may match; only the first is returned.
    pub fn find_match<'a>(
        &self,
        local: &LocalRecord,
        canonicals: &'a [CanonicalRecord],
    ) -> Option<&'a CanonicalRecord> {
        canonicals
            .iter()
            .find(|canonical| self.matches(local, canonical))
    }

    /// Whether any identifier of `local` is promo coded.
    pub fn is_promo_coded(&self, local: &LocalRecord) -> bool {
        self.raw_local_codes(local)
            .iter()
            .any(|code| self.promo.is_promo(code))
    }

    /// Returns the codes of a canonical composite, e.g. `["1-001H", "Re-001H"]`.
    pub fn canonical_codes(&self, canonical: &CanonicalRecord) -> Vec<String> {
        self.promo.split_codes(&canonical.code)
    }

    /// Returns every raw identifier code of `local`, de-duplicated in first-seen order.
    pub fn raw_local_codes(&self, local: &LocalRecord) -> Vec<String> {
        let mut codes: Vec<String> = Vec::new();
        let candidates = local
            .code()
            .map(|code| self.promo.split_codes(code))
            .unwrap_or_default()
            .into_iter()
            .chain(local.codes().into_iter().map(|code| code.trim().to_string()))
            .chain(local.primary_code().map(|code| code.trim().to_string()));

        for code in candidates {
            if !code.is_empty() && !codes.contains(&code) {
                codes.push(code);
            }
        }

        codes
    }

    pub(crate) fn local_codes(&self, local: &LocalRecord) -> Vec<LocalCode> {
        let mut codes = Vec::new();
        for raw in self.raw_local_codes(local) {
            let code = match self.promo.promo_suffix(&raw) {
                Some(suffix) => LocalCode::Promo(normalize_code(suffix)),
                None => LocalCode::Plain(normalize_code(&raw)),
            };

            let blank = matches!(&code, LocalCode::Plain(c) | LocalCode::Promo(c) if c.is_empty());
            if !blank && !codes.contains(&code) {
                codes.push(code);
            }
        }

        codes
    }

    fn code_matches(&self, local: &LocalCode, canonical: &str) -> bool {
        match local {
            LocalCode::Plain(code) => *code == normalize_code(canonical),
            LocalCode::Promo(suffix) => {
                let reduced = self.promo.promo_suffix(canonical).unwrap_or(canonical);
                *suffix == normalize_code(reduced)
            }
        }
    }

    pub(crate) fn sets_compatible(&self, local: &LocalRecord, canonical: &CanonicalRecord) -> bool {
        if !self.use_set_discriminator {
            return true;
        }

        let local_sets = normalized_sets(&local.sets());
        let canonical_sets = normalized_sets(&canonical.sets);
        if local_sets.is_empty() || canonical_sets.is_empty() {
            return true;
        }

        local_sets.iter().any(|set| canonical_sets.contains(set))
    }
}

impl Default for IdentifierMatcher {
    fn default() -> Self {
        Self::new(PromoPatterns::default(), true)
    }
}

fn normalized_sets(sets: &[String]) -> Vec<String> {
    sets.iter()
        .map(|set| {
            set.chars()
                .filter(|c| !c.is_whitespace())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|set| !set.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn local(value: serde_json::Value) -> LocalRecord {
        LocalRecord::new("local", value.as_object().unwrap().clone())
    }

    fn canonical(code: &str) -> CanonicalRecord {
        CanonicalRecord {
            code: code.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn any_local_code_matches_any_canonical_code() {
        let matcher = IdentifierMatcher::default();

        assert!(matcher.matches(&local(json!({"code": "1-001h"})), &canonical("1-001H")));
        assert!(matcher.matches(
            &local(json!({"codes": ["9-999X", "Re-001H"]})),
            &canonical("1-001H/Re-001H")
        ));
        assert!(matcher.matches(&local(json!({"primary_code": "1 001 H"})), &canonical("1-001H")));
        assert!(!matcher.matches(&local(json!({"code": "1-002H"})), &canonical("1-001H")));
    }

    #[test]
    fn promo_matching_is_asymmetric() {
        let matcher = IdentifierMatcher::default();

        assert!(matcher.matches(&local(json!({"code": "PR-001/1-001H"})), &canonical("1-001H")));
        assert!(!matcher.matches(&local(json!({"code": "1-001H"})), &canonical("PR-002/1-001H")));
        assert!(matcher.matches(
            &local(json!({"code": "PR-001/1-001H"})),
            &canonical("PR-002/1-001H")
        ));
    }

    #[test]
    fn set_discriminator_requires_intersection_when_both_present() {
        let matcher = IdentifierMatcher::default();
        let mut opus = canonical("1-001H");
        opus.sets = vec!["Opus I".to_string()];

        assert!(matcher.matches(&local(json!({"code": "1-001H", "sets": ["opus  i"]})), &opus));
        assert!(!matcher.matches(&local(json!({"code": "1-001H", "sets": ["Opus II"]})), &opus));
        assert!(matcher.matches(&local(json!({"code": "1-001H"})), &opus));

        let lenient = IdentifierMatcher::new(PromoPatterns::default(), false);
        assert!(lenient.matches(&local(json!({"code": "1-001H", "sets": ["Opus II"]})), &opus));
    }

    #[test]
    fn first_matching_canonical_wins() {
        let matcher = IdentifierMatcher::default();
        let canonicals = vec![canonical("2-001R"), canonical("1-001H"), canonical("1-001H/Re-001H")];

        let found = matcher.find_match(&local(json!({"code": "1-001H"})), &canonicals);

        assert_eq!(found.map(|c| c.code.as_str()), Some("1-001H"));
    }

    #[test]
    fn records_without_codes_never_match() {
        let matcher = IdentifierMatcher::default();

        assert!(!matcher.matches(&local(json!({"code": " - "})), &canonical("-")));
        assert!(!matcher.matches(&local(json!({})), &canonical("1-001H")));
    }
}
