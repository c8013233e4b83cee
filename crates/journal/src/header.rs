//! Journal entry header parsing/rendering (spec.md §4.3, §6).
//!
//! Three-dash fences delimit a YAML-like block. Keys may appear in any
//! order; `tags` is a sequence of `  - value` lines; every other key is a
//! scalar `key: value`, with an optional double-quoted value.

use concord_common::error::{AgentError, Result};
use concord_common::types::{JournalMetadata, RelevanceDecay};

pub fn render(meta: &JournalMetadata, content: &str) -> String {
    let mut out = String::new();
    out.push_str("---\n");
    out.push_str(&format!("title: \"{}\"\n", meta.title.replace('"', "\\\"")));
    out.push_str(&format!("author: \"{}\"\n", meta.author.replace('"', "\\\"")));
    out.push_str(&format!("created_at: \"{}\"\n", meta.created_at));
    out.push_str(&format!("relevance_decay: {}\n", meta.relevance_decay));
    out.push_str("tags:\n");
    for tag in &meta.tags {
        out.push_str(&format!("  - {tag}\n"));
    }
    out.push_str("---\n");
    out.push_str(content.trim());
    out.push('\n');
    out
}

pub fn parse(filename: &str, raw: &str) -> Result<(JournalMetadata, String)> {
    let mut lines = raw.lines();

    let first = lines.next().unwrap_or("").trim();
    if first != "---" {
        return Err(AgentError::CorruptState(format!("{filename}: missing header fence")));
    }

    let mut title = String::new();
    let mut author = String::new();
    let mut created_at = String::new();
    let mut relevance_decay = RelevanceDecay::Medium;
    let mut tags = Vec::new();
    let mut in_tags = false;
    let mut body_lines: Vec<&str> = Vec::new();
    let mut header_closed = false;

    for line in lines {
        if !header_closed {
            if line.trim() == "---" {
                header_closed = true;
                continue;
            }
            if let Some(rest) = line.strip_prefix("  - ") {
                if in_tags {
                    tags.push(rest.trim().to_string());
                    continue;
                }
            }
            in_tags = false;
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim();
                let value = value.trim();
                let value = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(value);
                match key {
                    "title" => title = value.to_string(),
                    "author" => author = value.to_string(),
                    "created_at" => created_at = value.to_string(),
                    "relevance_decay" => {
                        relevance_decay = value
                            .parse()
                            .map_err(|e| AgentError::CorruptState(format!("{filename}: {e}")))?;
                    }
                    "tags" => in_tags = true,
                    _ => {}
                }
            }
        } else {
            body_lines.push(line);
        }
    }

    if !header_closed {
        return Err(AgentError::CorruptState(format!("{filename}: unterminated header")));
    }

    let metadata = JournalMetadata {
        filename: filename.to_string(),
        title,
        author,
        created_at,
        relevance_decay,
        tags,
    };
    let content = body_lines.join("\n").trim().to_string();
    Ok((metadata, content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_title_author_tags_and_decay() {
        let meta = JournalMetadata {
            filename: "x.md".into(),
            title: "Build pipeline notes".into(),
            author: "librarian".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
            relevance_decay: RelevanceDecay::Fast,
            tags: vec!["build".into(), "ops".into()],
        };
        let rendered = render(&meta, "  some content  ");
        let (parsed, content) = parse("x.md", &rendered).unwrap();

        assert_eq!(parsed.title, meta.title);
        assert_eq!(parsed.author, meta.author);
        assert_eq!(parsed.tags, meta.tags);
        assert_eq!(parsed.relevance_decay, RelevanceDecay::Fast);
        assert_eq!(content, "some content");
    }

    #[test]
    fn missing_fence_is_corrupt() {
        let err = parse("bad.md", "no header here").unwrap_err();
        assert!(matches!(err, AgentError::CorruptState(_)));
    }
}
