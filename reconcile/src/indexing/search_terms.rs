use crate::matching::{PromoPatterns, normalize_code};
use crate::types::LocalRecord;

/// Shortest word prefix kept as a search term.
const MIN_PREFIX_CHARS: usize = 2;

/// Returns the sorted search terms of `record`.
///
/// Terms are the lower-cased prefixes of every word of the name, from two characters up to the
/// whole word, followed by the normalized identifier codes, also lower-cased.
pub fn search_terms(record: &LocalRecord, promo: &PromoPatterns) -> Vec<String> {
    let mut terms = Vec::new();

    if let Some(name) = record.name() {
        for word in name
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
        {
            let word = word.to_lowercase();
            let mut prefix = String::with_capacity(word.len());
            for (index, c) in word.chars().enumerate() {
                prefix.push(c);
                if index + 1 >= MIN_PREFIX_CHARS {
                    terms.push(prefix.clone());
                }
            }
        }
    }

    let codes = record
        .code()
        .map(|code| promo.split_codes(code))
        .unwrap_or_default()
        .into_iter()
        .chain(record.codes());
    for code in codes {
        let normalized = normalize_code(&code).to_lowercase();
        if !normalized.is_empty() {
            terms.push(normalized);
        }
    }

    terms.sort();
    terms.dedup();
    terms
}
