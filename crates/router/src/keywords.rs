//! Keyword extraction shared by every language extractor (spec.md §4.5):
//! keywords always include the route's name lowercased plus its
//! camel-case/snake-case parts.

use std::collections::BTreeSet;

pub fn split_identifier(name: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for ch in name.chars() {
        if ch == '_' || ch == '-' {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        current.push(ch.to_ascii_lowercase());
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

pub fn base_keywords(name: &str) -> BTreeSet<String> {
    let mut set: BTreeSet<String> = split_identifier(name).into_iter().collect();
    set.insert(name.to_lowercase());
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_snake_case() {
        assert_eq!(split_identifier("get_user_by_id"), vec!["get", "user", "by", "id"]);
    }

    #[test]
    fn splits_camel_case() {
        assert_eq!(split_identifier("getUserById"), vec!["get", "user", "by", "id"]);
    }

    #[test]
    fn base_keywords_includes_whole_name_lowercased() {
        let kws = base_keywords("GetUser");
        assert!(kws.contains("getuser"));
        assert!(kws.contains("get"));
        assert!(kws.contains("user"));
    }
}
