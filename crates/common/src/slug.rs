//! Slug rule (spec.md §6): lowercase, collapse whitespace/underscore runs to
//! a single hyphen, drop anything outside `[a-z0-9-]`, collapse repeated
//! hyphens, trim, truncate to 50, fall back to "untitled" if empty.

pub fn slugify(input: &str) -> String {
    let lower = input.to_lowercase();

    let mut collapsed = String::with_capacity(lower.len());
    let mut last_was_sep = false;
    for ch in lower.chars() {
        if ch.is_whitespace() || ch == '_' {
            if !last_was_sep {
                collapsed.push('-');
                last_was_sep = true;
            }
        } else {
            collapsed.push(ch);
            last_was_sep = false;
        }
    }

    let filtered: String = collapsed
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect();

    let mut deduped = String::with_capacity(filtered.len());
    let mut prev_hyphen = false;
    for ch in filtered.chars() {
        if ch == '-' {
            if !prev_hyphen {
                deduped.push(ch);
            }
            prev_hyphen = true;
        } else {
            deduped.push(ch);
            prev_hyphen = false;
        }
    }

    let trimmed = deduped.trim_matches('-');
    let truncated: String = trimmed.chars().take(50).collect();
    let truncated = truncated.trim_end_matches('-');

    if truncated.is_empty() {
        "untitled".to_string()
    } else {
        truncated.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugifies_a_typical_title() {
        assert_eq!(
            slugify("Meeting Prep: 2024 Q1  review!!"),
            "meeting-prep-2024-q1-review"
        );
    }

    #[test]
    fn blank_input_becomes_untitled() {
        assert_eq!(slugify("   "), "untitled");
    }

    #[test]
    fn truncates_to_fifty_characters() {
        let long = "a ".repeat(40);
        let slug = slugify(&long);
        assert!(slug.len() <= 50);
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn collapses_underscores_and_repeated_hyphens() {
        assert_eq!(slugify("already__slugged---title"), "already-slugged-title");
    }
}
