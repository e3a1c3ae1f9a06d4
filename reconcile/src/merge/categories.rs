use crate::types::CanonicalRecord;

/// Separators found between categories of a composite category field.
const CATEGORY_SEPARATORS: &[&str] = &["&middot;", "·", "/", ","];

/// Builds the category list of a canonical record.
///
/// Both composite fields are split, blank entries dropped and duplicates removed. Entries listed
/// in `primary_group` come first, in first-seen order, followed by every other entry in
/// first-seen order.
pub fn canonical_categories(canonical: &CanonicalRecord, primary_group: &[String]) -> Vec<String> {
    let mut categories: Vec<String> = Vec::new();

    for composite in [&canonical.category_1, &canonical.category_2].into_iter().flatten() {
        for category in split_composite(composite) {
            if !categories.contains(&category) {
                categories.push(category);
            }
        }
    }

    let (mut primary, secondary): (Vec<String>, Vec<String>) = categories
        .into_iter()
        .partition(|category| primary_group.iter().any(|entry| entry == category));
    primary.extend(secondary);

    primary
}

fn split_composite(composite: &str) -> Vec<String> {
    let mut parts = vec![composite.to_string()];
    for separator in CATEGORY_SEPARATORS {
        parts = parts
            .iter()
            .flat_map(|part| part.split(separator))
            .map(str::to_string)
            .collect();
    }

    parts
        .into_iter()
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roman() -> Vec<String> {
        ["I", "II", "VII", "X"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn composites_split_on_every_separator() {
        let canonical = CanonicalRecord {
            category_1: Some("DFF &middot; VII".to_string()),
            category_2: Some("X/Crystal Chronicles, VII·Type-0".to_string()),
            ..Default::default()
        };

        assert_eq!(
            canonical_categories(&canonical, &roman()),
            vec!["VII", "X", "DFF", "Crystal Chronicles", "Type-0"]
        );
    }

    #[test]
    fn missing_composites_yield_no_categories() {
        assert!(canonical_categories(&CanonicalRecord::default(), &roman()).is_empty());
    }
}
