use crate::StateStore;
use concord_common::error::{AgentError, Result};
use concord_common::types::{new_id, now_iso, FileIndexEntry};
use sqlx::Row;
use std::collections::BTreeSet;

fn store_err(e: sqlx::Error) -> AgentError {
    AgentError::StoreUnavailable(e.to_string())
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<FileIndexEntry> {
    let tags_raw: String = row.try_get("tags").map_err(store_err)?;
    let tags: BTreeSet<String> = serde_json::from_str(&tags_raw).unwrap_or_default();
    Ok(FileIndexEntry {
        id: row.try_get("id").map_err(store_err)?,
        path: row.try_get("path").map_err(store_err)?,
        extension: row.try_get("extension").map_err(store_err)?,
        size: row.try_get("size").map_err(store_err)?,
        modified_at: row.try_get("modified_at").map_err(store_err)?,
        indexed_at: row.try_get("indexed_at").map_err(store_err)?,
        summary: row.try_get("summary").map_err(store_err)?,
        tags,
    })
}

impl StateStore {
    /// Upsert by unique `path`; preserves the `id` of an existing row
    /// (spec.md §4.2 invariant: re-indexing the same file never duplicates).
    pub async fn add_file_to_index(
        &self,
        path: &str,
        extension: &str,
        size: i64,
        modified_at: &str,
        summary: Option<&str>,
        tags: &BTreeSet<String>,
    ) -> Result<String> {
        let tags_json = serde_json::to_string(tags)?;
        let indexed_at = now_iso();

        if let Some(existing) = sqlx::query("SELECT id FROM file_index WHERE path = ?")
            .bind(path)
            .fetch_optional(self.pool())
            .await
            .map_err(store_err)?
        {
            let id: String = existing.try_get("id").map_err(store_err)?;
            sqlx::query(
                "UPDATE file_index SET extension = ?, size = ?, modified_at = ?, indexed_at = ?, summary = ?, tags = ? WHERE id = ?",
            )
            .bind(extension)
            .bind(size)
            .bind(modified_at)
            .bind(&indexed_at)
            .bind(summary)
            .bind(&tags_json)
            .bind(&id)
            .execute(self.pool())
            .await
            .map_err(store_err)?;
            Ok(id)
        } else {
            let id = new_id();
            sqlx::query(
                "INSERT INTO file_index (id, path, extension, size, modified_at, indexed_at, summary, tags)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(path)
            .bind(extension)
            .bind(size)
            .bind(modified_at)
            .bind(&indexed_at)
            .bind(summary)
            .bind(&tags_json)
            .execute(self.pool())
            .await
            .map_err(store_err)?;
            Ok(id)
        }
    }

    pub async fn get_file_by_path(&self, path: &str) -> Result<Option<FileIndexEntry>> {
        let row = sqlx::query("SELECT * FROM file_index WHERE path = ?")
            .bind(path)
            .fetch_optional(self.pool())
            .await
            .map_err(store_err)?;
        row.as_ref().map(row_to_entry).transpose()
    }

    /// `path_pattern` is a SQL `LIKE` glob; the tags filter is any-overlap
    /// (spec.md §4.2).
    pub async fn search_file_index(
        &self,
        extension: Option<&str>,
        tags: Option<&[String]>,
        path_pattern: Option<&str>,
        limit: i64,
    ) -> Result<Vec<FileIndexEntry>> {
        let mut sql = String::from("SELECT * FROM file_index WHERE 1=1");
        if extension.is_some() {
            sql.push_str(" AND extension = ?");
        }
        if path_pattern.is_some() {
            sql.push_str(" AND path LIKE ?");
        }
        sql.push_str(" ORDER BY indexed_at DESC LIMIT ?");

        // Tag overlap is filtered in memory below, so over-fetch when a tag
        // filter is present to still return up to `limit` matches.
        let fetch_limit = if tags.is_some() { limit.max(1) * 8 } else { limit };

        let mut query = sqlx::query(&sql);
        if let Some(ext) = extension {
            query = query.bind(ext);
        }
        if let Some(pattern) = path_pattern {
            query = query.bind(pattern);
        }
        query = query.bind(fetch_limit);
        let rows = query.fetch_all(self.pool()).await.map_err(store_err)?;
        let mut entries: Vec<FileIndexEntry> = rows.iter().map(row_to_entry).collect::<Result<_>>()?;

        if let Some(want) = tags {
            let want: BTreeSet<&str> = want.iter().map(|s| s.as_str()).collect();
            entries.retain(|e| e.tags.iter().any(|t| want.contains(t.as_str())));
        }
        entries.truncate(limit as usize);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reindexing_same_path_preserves_id() {
        let store = StateStore::connect_in_memory().await.unwrap();
        let tags: BTreeSet<String> = ["code"].iter().map(|s| s.to_string()).collect();
        let id1 = store.add_file_to_index("/tmp/a.py", "py", 10, "2026-01-01T00:00:00Z", None, &tags).await.unwrap();
        let id2 = store.add_file_to_index("/tmp/a.py", "py", 20, "2026-01-02T00:00:00Z", None, &tags).await.unwrap();
        assert_eq!(id1, id2);

        let all = store.search_file_index(None, None, None, 10).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].size, 20);
    }

    #[tokio::test]
    async fn search_filters_by_extension_and_tags() {
        let store = StateStore::connect_in_memory().await.unwrap();
        let py_tags: BTreeSet<String> = ["backend"].iter().map(|s| s.to_string()).collect();
        let txt_tags: BTreeSet<String> = ["notes"].iter().map(|s| s.to_string()).collect();
        store.add_file_to_index("/tmp/a.py", "py", 1, "2026-01-01T00:00:00Z", None, &py_tags).await.unwrap();
        store.add_file_to_index("/tmp/b.txt", "txt", 1, "2026-01-01T00:00:00Z", None, &txt_tags).await.unwrap();

        let py_only = store.search_file_index(Some("py"), None, None, 10).await.unwrap();
        assert_eq!(py_only.len(), 1);
        assert_eq!(py_only[0].path, "/tmp/a.py");

        let by_tag = store.search_file_index(None, Some(&["backend".to_string()]), None, 10).await.unwrap();
        assert_eq!(by_tag.len(), 1);
        assert_eq!(by_tag[0].path, "/tmp/a.py");
    }
}
