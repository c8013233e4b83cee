//! Journal index: a serialised mirror of entry metadata for scan-free
//! search (spec.md §4.3). Loaded on demand, persisted after every mutation.

use concord_common::error::{AgentError, Result};
use concord_common::types::JournalMetadata;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
struct IndexFile {
    entries: Vec<JournalMetadata>,
}

pub struct JournalIndex {
    path: PathBuf,
}

impl JournalIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<IndexFile> {
        match fs::read_to_string(&self.path).await {
            Ok(raw) => {
                if raw.trim().is_empty() {
                    Ok(IndexFile::default())
                } else {
                    serde_json::from_str(&raw)
                        .map_err(|e| AgentError::CorruptState(format!("journal index: {e}")))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(IndexFile::default()),
            Err(e) => Err(AgentError::Io(e)),
        }
    }

    async fn save(&self, file: &IndexFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let raw = serde_json::to_string_pretty(file)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Upsert by filename (spec.md §4.3).
    pub async fn add_entry(&self, metadata: JournalMetadata) -> Result<()> {
        let mut file = self.load().await?;
        file.entries.retain(|e| e.filename != metadata.filename);
        file.entries.push(metadata);
        self.save(&file).await
    }

    pub async fn remove_entry(&self, filename: &str) -> Result<()> {
        let mut file = self.load().await?;
        file.entries.retain(|e| e.filename != filename);
        self.save(&file).await
    }

    pub async fn get_recent(&self, limit: usize) -> Result<Vec<JournalMetadata>> {
        let mut file = self.load().await?;
        file.entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        file.entries.truncate(limit);
        Ok(file.entries)
    }

    pub async fn get_by_author(&self, author: &str) -> Result<Vec<JournalMetadata>> {
        let file = self.load().await?;
        Ok(file.entries.into_iter().filter(|e| e.author == author).collect())
    }

    pub async fn get_by_date_range(&self, start: &str, end: &str) -> Result<Vec<JournalMetadata>> {
        let file = self.load().await?;
        Ok(file
            .entries
            .into_iter()
            .filter(|e| e.created_at.as_str() >= start && e.created_at.as_str() <= end)
            .collect())
    }

    pub async fn get_all_tags(&self) -> Result<BTreeSet<String>> {
        let file = self.load().await?;
        Ok(file.entries.iter().flat_map(|e| e.tags.iter().cloned()).collect())
    }

    pub async fn all_entries(&self) -> Result<Vec<JournalMetadata>> {
        Ok(self.load().await?.entries)
    }

    /// `tags` (if non-empty): entry must share at least one tag with the
    /// query. `keywords` (if non-empty): any space-split token must
    /// substring-match the lowercased title or lowercased joined tags
    /// (spec.md §4.3).
    pub async fn search(&self, tags: &[String], keywords: &str) -> Result<Vec<JournalMetadata>> {
        let file = self.load().await?;
        let want_tags: BTreeSet<&str> = tags.iter().map(String::as_str).collect();
        let tokens: Vec<String> = keywords.split_whitespace().map(|t| t.to_lowercase()).collect();

        Ok(file
            .entries
            .into_iter()
            .filter(|e| {
                let tag_ok = want_tags.is_empty() || e.tags.iter().any(|t| want_tags.contains(t.as_str()));
                let kw_ok = if tokens.is_empty() {
                    true
                } else {
                    let title = e.title.to_lowercase();
                    let joined_tags = e.tags.join(" ").to_lowercase();
                    tokens.iter().any(|t| title.contains(t.as_str()) || joined_tags.contains(t.as_str()))
                };
                tag_ok && kw_ok
            })
            .collect())
    }
}

pub fn path_for(journal_dir: &Path) -> PathBuf {
    journal_dir.join("index.json")
}
