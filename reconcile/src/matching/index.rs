use std::collections::HashMap;

use crate::matching::{IdentifierMatcher, LocalCode, normalize_code};
use crate::types::{CanonicalRecord, LocalRecord};

/// Lookup of canonical records by normalized code.
///
/// Candidate lists hold ascending positions in the canonical slice, so [`CanonicalIndex::find`]
/// returns the same record as [`IdentifierMatcher::find_match`] without scanning the catalog.
#[derive(Debug)]
pub struct CanonicalIndex<'a> {
    matcher: &'a IdentifierMatcher,
    canonicals: &'a [CanonicalRecord],
    /// Codes without promo prefix, by normalized code.
    plain: HashMap<String, Vec<usize>>,
    /// Promo-coded codes, by normalized full code.
    promo_full: HashMap<String, Vec<usize>>,
    /// Promo-coded codes, by normalized suffix.
    promo_suffix: HashMap<String, Vec<usize>>,
}

impl<'a> CanonicalIndex<'a> {
    pub fn build(matcher: &'a IdentifierMatcher, canonicals: &'a [CanonicalRecord]) -> Self {
        let mut plain: HashMap<String, Vec<usize>> = HashMap::new();
        let mut promo_full: HashMap<String, Vec<usize>> = HashMap::new();
        let mut promo_suffix: HashMap<String, Vec<usize>> = HashMap::new();

        for (position, canonical) in canonicals.iter().enumerate() {
            for code in matcher.canonical_codes(canonical) {
                let normalized = normalize_code(&code);
                if normalized.is_empty() {
                    continue;
                }

                match matcher.promo_patterns().promo_suffix(&code) {
                    Some(suffix) => {
                        push_position(&mut promo_full, normalized, position);
                        let suffix = normalize_code(suffix);
                        if !suffix.is_empty() {
                            push_position(&mut promo_suffix, suffix, position);
                        }
                    }
                    None => push_position(&mut plain, normalized, position),
                }
            }
        }

        Self {
            matcher,
            canonicals,
            plain,
            promo_full,
            promo_suffix,
        }
    }

    pub fn len(&self) -> usize {
        self.canonicals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonicals.is_empty()
    }

    /// Returns the lowest-positioned canonical record matching `local`, with its position.
    pub fn find(&self, local: &LocalRecord) -> Option<(usize, &'a CanonicalRecord)> {
        let mut candidates: Vec<usize> = Vec::new();
        for code in self.matcher.local_codes(local) {
            let (code, promo_map) = match &code {
                LocalCode::Plain(code) => (code, &self.promo_full),
                LocalCode::Promo(suffix) => (suffix, &self.promo_suffix),
            };

            for map in [&self.plain, promo_map] {
                if let Some(positions) = map.get(code) {
                    candidates.extend(positions);
                }
            }
        }

        candidates.sort_unstable();
        candidates.dedup();

        candidates.into_iter().find_map(|position| {
            let canonical = &self.canonicals[position];
            self.matcher
                .sets_compatible(local, canonical)
                .then_some((position, canonical))
        })
    }
}

fn push_position(map: &mut HashMap<String, Vec<usize>>, code: String, position: usize) {
    let positions = map.entry(code).or_default();
    if positions.last() != Some(&position) {
        positions.push(position);
    }
}

#[cfg(test)]
mod tests {
    use rand::seq::SliceRandom;
    use serde_json::json;

    use super::*;

    fn canonical(code: &str, sets: &[&str]) -> CanonicalRecord {
        CanonicalRecord {
            code: code.to_string(),
            sets: sets.iter().map(|set| set.to_string()).collect(),
            ..Default::default()
        }
    }

    fn local(value: serde_json::Value) -> LocalRecord {
        LocalRecord::new("local", value.as_object().unwrap().clone())
    }

    #[test]
    fn index_returns_lowest_position_satisfying_the_discriminator() {
        let matcher = IdentifierMatcher::default();
        let canonicals = vec![
            canonical("1-001H", &["Opus I"]),
            canonical("1-001H/Re-001H", &["Opus II"]),
            canonical("PR-003/1-001H", &[]),
        ];
        let index = CanonicalIndex::build(&matcher, &canonicals);

        let found = index.find(&local(json!({"code": "1-001H", "sets": ["Opus II"]})));
        assert_eq!(found.map(|(position, _)| position), Some(1));

        let found = index.find(&local(json!({"code": "PR-009/1-001H", "sets": ["Promo"]})));
        assert_eq!(found.map(|(position, _)| position), Some(2));

        assert!(index.find(&local(json!({"code": "9-999X"}))).is_none());
    }

    #[test]
    fn index_agrees_with_linear_search_in_any_order() {
        let matcher = IdentifierMatcher::default();
        let mut canonicals = vec![
            canonical("1-001H", &["Opus I"]),
            canonical("1-001H/Re-001H", &[]),
            canonical("PR-002/1-001H", &[]),
            canonical("2-010C", &["Opus II"]),
            canonical("2-010C", &["Opus III"]),
            canonical("PR-010/2-010C", &["Promo"]),
        ];
        let locals = vec![
            local(json!({"code": "1-001H"})),
            local(json!({"code": "PR-001/1-001H"})),
            local(json!({"codes": ["Re-001H"], "sets": ["Opus IX"]})),
            local(json!({"code": "2-010C", "sets": ["Opus III"]})),
            local(json!({"primary_code": "PR-077/2-010C", "sets": ["promo"]})),
            local(json!({"code": "PR0021001H"})),
        ];

        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            canonicals.shuffle(&mut rng);
            let index = CanonicalIndex::build(&matcher, &canonicals);

            for record in &locals {
                let expected = matcher.find_match(record, &canonicals).map(|c| c as *const _);
                let actual = index.find(record).map(|(_, c)| c as *const _);
                assert_eq!(actual, expected, "{record:?}");
            }
        }
    }
}
