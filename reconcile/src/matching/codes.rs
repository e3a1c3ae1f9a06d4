use regex::Regex;

use crate::error::SyncResult;

/// Characters removed from identifier codes before comparison, besides whitespace.
const STRIPPED_CHARACTERS: &[char] = &['-', '.', ',', ';', '/'];

/// Separator between the codes of a composite identifier.
pub const CODE_SEPARATOR: char = '/';

/// Normalizes an identifier code for comparison: separators and whitespace are removed and
/// letters upper-cased, so `"1-001h"` and `"1 001H"` both become `"1001H"`.
pub fn normalize_code(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace() && !STRIPPED_CHARACTERS.contains(c))
        .flat_map(char::to_uppercase)
        .collect()
}

/// Recognizes promo-coded identifiers such as `"PR-001/1-001H"`.
///
/// A promo code starts with a prefix matched by one of the patterns; the prefix includes the `/`
/// that separates it from the code of the printing it reproduces.
#[derive(Debug, Clone)]
pub struct PromoPatterns {
    patterns: Vec<Regex>,
}

impl PromoPatterns {
    /// Default pattern: `PR` and a number, e.g. `PR-001/` or `PR12/`.
    pub const DEFAULT_PATTERN: &'static str = r"^PR-?\d+/";

    pub fn new<I, P>(patterns: I) -> SyncResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| Regex::new(pattern.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    /// Returns the part of `code` after its promo prefix, or [`None`] when `code` is not promo
    /// coded.
    pub fn promo_suffix<'a>(&self, code: &'a str) -> Option<&'a str> {
        let trimmed = code.trim();

        self.patterns
            .iter()
            .find_map(|pattern| pattern.find(trimmed).filter(|found| found.start() == 0))
            .map(|found| &trimmed[found.end()..])
    }

    pub fn is_promo(&self, code: &str) -> bool {
        self.promo_suffix(code).is_some()
    }

    /// Splits a composite identifier into its codes.
    ///
    /// Codes are separated by `/`, except that a composite starting with a promo prefix is kept
    /// whole, since its `/` belongs to the promo notation. Blank parts are dropped.
    pub fn split_codes(&self, composite: &str) -> Vec<String> {
        let trimmed = composite.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        if self.is_promo(trimmed) {
            return vec![trimmed.to_string()];
        }

        trimmed
            .split(CODE_SEPARATOR)
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Default for PromoPatterns {
    fn default() -> Self {
        // The default pattern is a constant known to compile.
        Self {
            patterns: Regex::new(Self::DEFAULT_PATTERN).into_iter().collect(),
        }
    }
}
