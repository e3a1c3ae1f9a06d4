//! Translation of source notations into the display vocabulary stored on local records.

use serde_json::Value;

/// Element glyphs used by the reference catalog and their display names.
const ELEMENT_GLYPHS: &[(&str, &str)] = &[
    ("火", "Fire"),
    ("氷", "Ice"),
    ("風", "Wind"),
    ("土", "Earth"),
    ("雷", "Lightning"),
    ("水", "Water"),
    ("光", "Light"),
    ("闇", "Dark"),
];

/// Rarity codes used by the reference catalog and their display names.
const RARITY_CODES: &[(&str, &str)] = &[
    ("C", "Common"),
    ("R", "Rare"),
    ("H", "Hero"),
    ("L", "Legend"),
    ("S", "Starter"),
    ("P", "Promo"),
    ("B", "Boss"),
];

/// Returns the display name of an element given as a glyph or already as a name.
///
/// Unknown values are returned trimmed and unchanged.
pub fn element_name(raw: &str) -> String {
    let trimmed = raw.trim();

    ELEMENT_GLYPHS
        .iter()
        .find(|(glyph, name)| *glyph == trimmed || name.eq_ignore_ascii_case(trimmed))
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Translates, sorts and de-duplicates a list of elements. Blank entries are dropped.
///
/// A single entry holding several glyphs, e.g. `"火氷"`, yields one element per glyph.
pub fn element_names(raw: &[String]) -> Vec<String> {
    let mut names: Vec<String> = raw
        .iter()
        .flat_map(|entry| split_glyphs(entry))
        .filter(|entry| !entry.is_empty())
        .map(|entry| element_name(&entry))
        .collect();

    names.sort();
    names.dedup();
    names
}

fn split_glyphs(entry: &str) -> Vec<String> {
    let trimmed = entry.trim();
    let all_glyphs = !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| ELEMENT_GLYPHS.iter().any(|(glyph, _)| glyph.starts_with(c)));

    if all_glyphs {
        trimmed.chars().map(String::from).collect()
    } else {
        vec![trimmed.to_string()]
    }
}

/// Returns the display name of a rarity code. Display names and unknown codes pass through.
pub fn rarity_name(raw: &str) -> String {
    let trimmed = raw.trim();

    RARITY_CODES
        .iter()
        .find(|(code, name)| code.eq_ignore_ascii_case(trimmed) || name.eq_ignore_ascii_case(trimmed))
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

/// Converts a raw numeric string, e.g. a cost or a power, into a JSON value.
///
/// Integers become JSON numbers, other non-blank text is kept as a trimmed string and blank
/// input yields [`None`].
pub fn numeric_value(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    match trimmed.parse::<i64>() {
        Ok(number) => Some(Value::from(number)),
        Err(_) => Some(Value::String(trimmed.to_string())),
    }
}
