//! Write-once journal with a tag/time index and ranked hybrid retrieval
//! (spec.md §4.3).
//!
//! Entries are markdown files named `YYYY-MM-DD_HH-MM-SS_<slug>.md` under a
//! configured directory; a sidecar `index.json` mirrors their metadata so
//! search never has to scan the filesystem.

mod header;
mod index;

pub use index::JournalIndex;

use chrono::{DateTime, Utc};
use concord_common::error::{AgentError, Result};
use concord_common::slug::slugify;
use concord_common::types::{new_id, now_iso, JournalMetadata, RankedEntry, RelevanceDecay};
use std::path::PathBuf;
use tokio::fs;

pub struct Journal {
    dir: PathBuf,
    index: JournalIndex,
}

impl Journal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let index = JournalIndex::new(index::path_for(&dir));
        Self { dir, index }
    }

    pub fn index(&self) -> &JournalIndex {
        &self.index
    }

    fn entry_path(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Writes header + body atomically, then upserts the index
    /// (spec.md §4.3 write path). Returns the entry's filename.
    pub async fn write_entry(
        &self,
        author: &str,
        tags: Vec<String>,
        summary: &str,
        content: &str,
        decay: RelevanceDecay,
    ) -> Result<String> {
        fs::create_dir_all(&self.dir).await?;

        let now = Utc::now();
        let slug = slugify(summary);
        // Timestamp precision keeps the filename unique even under rapid
        // successive writes; a true collision (same second, same slug)
        // still resolves: the file write wins by overwrite, the index
        // upserts by filename (spec.md §4.3).
        let filename = format!("{}_{slug}.md", now.format("%Y-%m-%d_%H-%M-%S"));
        let created_at = now_iso();

        let metadata = JournalMetadata {
            filename: filename.clone(),
            title: summary.to_string(),
            author: author.to_string(),
            created_at,
            relevance_decay: decay,
            tags,
        };

        let rendered = header::render(&metadata, content);
        let path = self.entry_path(&filename);
        let tmp = path.with_extension("md.tmp");
        fs::write(&tmp, rendered).await?;
        fs::rename(&tmp, &path).await?;

        self.index.add_entry(metadata).await?;
        Ok(filename)
    }

    /// Parses the header from the file on disk (spec.md §4.3 read path).
    pub async fn read_entry(&self, filename: &str) -> Result<(JournalMetadata, String)> {
        let path = self.entry_path(filename);
        let raw = fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AgentError::NotFound(format!("journal entry: {filename}"))
            } else {
                AgentError::Io(e)
            }
        })?;
        header::parse(filename, &raw)
    }

    /// Ranked hybrid retrieval (spec.md §4.3).
    pub async fn retrieve(&self, tags: &[String], query_text: &str, top_n: usize) -> Result<Vec<RankedEntry>> {
        let candidates = if !tags.is_empty() || !query_text.trim().is_empty() {
            self.index.search(tags, query_text).await?
        } else {
            self.index.all_entries().await?
        };

        let now = Utc::now();
        let mut ranked: Vec<RankedEntry> = candidates
            .into_iter()
            .map(|metadata| {
                let (relevance, recency) = score(&metadata, tags, query_text, now);
                let combined = 0.6 * relevance + 0.4 * recency;
                RankedEntry { metadata, combined, relevance, recency }
            })
            .collect();

        ranked.sort_by(|a, b| b.combined.partial_cmp(&a.combined).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_n);
        Ok(ranked)
    }

    /// Uses `filename`'s own tags as the query, excluding it from results
    /// (spec.md §4.3).
    pub async fn get_related_entries(&self, filename: &str, top_n: usize) -> Result<Vec<RankedEntry>> {
        let all = self.index.all_entries().await?;
        let reference = all
            .iter()
            .find(|e| e.filename == filename)
            .ok_or_else(|| AgentError::NotFound(format!("journal entry: {filename}")))?
            .clone();

        let mut ranked = self.retrieve(&reference.tags, "", top_n + 1).await?;
        ranked.retain(|r| r.metadata.filename != filename);
        ranked.truncate(top_n);
        Ok(ranked)
    }
}

fn score(metadata: &JournalMetadata, tags: &[String], query_text: &str, now: DateTime<Utc>) -> (f64, f64) {
    let has_tags = !tags.is_empty();
    let tokens: Vec<String> = query_text.split_whitespace().map(|t| t.to_lowercase()).collect();
    let has_keywords = !tokens.is_empty();

    let relevance = if !has_tags && !has_keywords {
        0.5
    } else {
        let mut sum = 0.0;
        let mut max_possible = 0.0;

        if has_tags {
            let entry_tags: std::collections::BTreeSet<&str> = metadata.tags.iter().map(String::as_str).collect();
            let overlap = tags.iter().filter(|t| entry_tags.contains(t.as_str())).count();
            sum += (overlap as f64 / tags.len() as f64) * 0.5;
            max_possible += 0.5;
        }
        if has_keywords {
            let title = metadata.title.to_lowercase();
            let joined_tags = metadata.tags.join(" ").to_lowercase();
            let in_title = tokens.iter().filter(|t| title.contains(t.as_str())).count() as f64 / tokens.len() as f64;
            let in_tags = tokens.iter().filter(|t| joined_tags.contains(t.as_str())).count() as f64 / tokens.len() as f64;
            sum += in_title.max(in_tags) * 0.5;
            max_possible += 0.5;
        }
        if max_possible > 0.0 {
            sum / max_possible
        } else {
            0.5
        }
    };

    let recency = match DateTime::parse_from_rfc3339(&metadata.created_at) {
        Ok(created) => {
            let age_days = (now - created.with_timezone(&Utc)).num_seconds() as f64 / 86400.0;
            (-metadata.relevance_decay.rate() * age_days).exp().clamp(0.0, 1.0)
        }
        Err(_) => 0.5,
    };

    (relevance, recency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_common::types::RelevanceDecay;
    use tempfile::tempdir;

    #[tokio::test]
    async fn write_then_read_round_trips_metadata_and_content() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path());

        let filename = journal
            .write_entry(
                "librarian",
                vec!["build".into(), "ops".into()],
                "Meeting Prep: 2024 Q1  review!!",
                "Notes about the release pipeline.",
                RelevanceDecay::Medium,
            )
            .await
            .unwrap();

        assert!(filename.ends_with("_meeting-prep-2024-q1-review.md"));

        let (metadata, content) = journal.read_entry(&filename).await.unwrap();
        assert_eq!(metadata.author, "librarian");
        assert_eq!(metadata.tags, vec!["build".to_string(), "ops".to_string()]);
        assert_eq!(content, "Notes about the release pipeline.");
    }

    #[tokio::test]
    async fn write_entry_upserts_into_index() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path());
        journal
            .write_entry("director", vec!["alpha".into()], "first note", "body", RelevanceDecay::Fast)
            .await
            .unwrap();
        journal
            .write_entry("director", vec!["beta".into()], "second note", "body", RelevanceDecay::Fast)
            .await
            .unwrap();

        let recent = journal.index().get_recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[tokio::test]
    async fn retrieve_ranks_tag_and_keyword_matches_above_baseline() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path());

        journal
            .write_entry("librarian", vec!["indexing".into()], "Indexed the payments module", "body", RelevanceDecay::Slow)
            .await
            .unwrap();
        journal
            .write_entry("librarian", vec!["unrelated".into()], "Weather was nice today", "body", RelevanceDecay::Slow)
            .await
            .unwrap();

        let ranked = journal.retrieve(&["indexing".to_string()], "payments", 10).await.unwrap();
        assert_eq!(ranked.len(), 1);
        assert!(ranked[0].metadata.title.contains("payments"));
        assert!(ranked[0].relevance > 0.9);
    }

    #[tokio::test]
    async fn retrieve_with_no_query_uses_baseline_relevance_and_recency_order() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path());

        journal.write_entry("director", vec![], "older entry", "body", RelevanceDecay::Fast).await.unwrap();
        journal.write_entry("director", vec![], "newer entry", "body", RelevanceDecay::Fast).await.unwrap();

        let ranked = journal.retrieve(&[], "", 10).await.unwrap();
        assert_eq!(ranked.len(), 2);
        for r in &ranked {
            assert!((r.relevance - 0.5).abs() < 1e-9);
        }
        // Both entries were written moments apart; recency difference should
        // be negligible, but neither score may exceed 1.0.
        assert!(ranked.iter().all(|r| r.recency <= 1.0));
    }

    #[tokio::test]
    async fn get_related_entries_excludes_the_reference_and_uses_its_tags() {
        let dir = tempdir().unwrap();
        let journal = Journal::new(dir.path());

        let reference = journal
            .write_entry("librarian", vec!["routing".into()], "reference entry", "body", RelevanceDecay::Medium)
            .await
            .unwrap();
        journal
            .write_entry("librarian", vec!["routing".into()], "related entry", "body", RelevanceDecay::Medium)
            .await
            .unwrap();
        journal
            .write_entry("librarian", vec!["other".into()], "unrelated entry", "body", RelevanceDecay::Medium)
            .await
            .unwrap();

        let related = journal.get_related_entries(&reference, 10).await.unwrap();
        assert!(related.iter().all(|r| r.metadata.filename != reference));
        assert!(related.iter().any(|r| r.metadata.title == "related entry"));
    }

    #[test]
    fn new_id_and_now_iso_are_usable_for_correlation() {
        // Sanity check that common helpers re-exported here still work as
        // expected for callers that stamp ad-hoc records around journal use.
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
        assert!(!now_iso().is_empty());
    }
}
