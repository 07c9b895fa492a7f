//! Tag merging and rule tag matching

use std::collections::HashSet;

/// Concatenate tag lists in order, keeping the first occurrence of each tag.
pub fn merge<'a, I>(lists: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();

    for tag in lists.into_iter().flatten() {
        if seen.insert(tag.as_str()) {
            merged.push(tag.clone());
        }
    }

    merged
}

/// Whether a rule with `rule_tags` applies to an entity tagged `tags`.
///
/// An empty rule filter matches everything, including an untagged entity.
pub fn has_matching(tags: &[String], rule_tags: &[String]) -> bool {
    if rule_tags.is_empty() {
        return true;
    }

    let tags: HashSet<&str> = tags.iter().map(String::as_str).collect();
    rule_tags.iter().any(|tag| tags.contains(tag.as_str()))
}
