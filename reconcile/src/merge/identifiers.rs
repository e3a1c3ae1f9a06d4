use crate::matching::{CODE_SEPARATOR, normalize_code};

/// Identifier fields derived for a local record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierSet {
    /// Composite display form, codes joined by `/`.
    pub code: String,
    pub codes: Vec<String>,
    pub primary_code: String,
}

/// Returns the codes of `local_codes` that carry an extension prefix and are not canonical.
///
/// Prefixes are compared case-insensitively and codes after normalization.
pub fn extension_codes(
    local_codes: &[String],
    canonical_codes: &[String],
    extension_prefixes: &[String],
) -> Vec<String> {
    let canonical: Vec<String> = canonical_codes.iter().map(|code| normalize_code(code)).collect();
    let mut extensions: Vec<String> = Vec::new();

    for code in local_codes {
        let code = code.trim();
        let normalized = normalize_code(code);
        if normalized.is_empty()
            || !has_extension_prefix(code, extension_prefixes)
            || canonical.contains(&normalized)
            || extensions.iter().any(|known| normalize_code(known) == normalized)
        {
            continue;
        }

        extensions.push(code.to_string());
    }

    extensions
}

/// Merges canonical codes and local extension codes.
///
/// Canonical codes come first in source order, followed by extensions. The primary code is the
/// first code without an extension prefix, or the first code when all of them carry one.
/// Returns [`None`] when there is no code at all.
pub fn merge_identifiers(
    canonical_codes: &[String],
    extensions: &[String],
    extension_prefixes: &[String],
) -> Option<IdentifierSet> {
    let mut codes: Vec<String> = Vec::new();
    for code in canonical_codes.iter().chain(extensions) {
        let code = code.trim();
        let normalized = normalize_code(code);
        if normalized.is_empty() || codes.iter().any(|known| normalize_code(known) == normalized) {
            continue;
        }
        codes.push(code.to_string());
    }

    let primary_code = codes
        .iter()
        .find(|code| !has_extension_prefix(code, extension_prefixes))
        .or_else(|| codes.first())?
        .clone();

    let separator = CODE_SEPARATOR.to_string();

    Some(IdentifierSet {
        code: codes.join(separator.as_str()),
        codes,
        primary_code,
    })
}

fn has_extension_prefix(code: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| {
        code.get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
    })
}
