use crate::StateStore;
use concord_common::error::{AgentError, Result};
use concord_common::types::now_iso;
use sqlx::Row;

fn store_err(e: sqlx::Error) -> AgentError {
    AgentError::StoreUnavailable(e.to_string())
}

impl StateStore {
    /// Upsert: context values are JSON-encoded on write, JSON-decoded on
    /// read; consumers treat the schema as soft (spec.md §4.2).
    pub async fn set_context(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let encoded = serde_json::to_string(value)?;
        sqlx::query(
            "INSERT INTO context_entries (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(encoded)
        .bind(now_iso())
        .execute(self.pool())
        .await
        .map_err(store_err)?;
        Ok(())
    }

    pub async fn get_context(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let row = sqlx::query("SELECT value FROM context_entries WHERE key = ?")
            .bind(key)
            .fetch_optional(self.pool())
            .await
            .map_err(store_err)?;
        match row {
            Some(row) => {
                let raw: String = row.try_get("value").map_err(store_err)?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_context_is_upsert() {
        let store = StateStore::connect_in_memory().await.unwrap();
        store.set_context("last_sync", &serde_json::json!({"n": 1})).await.unwrap();
        store.set_context("last_sync", &serde_json::json!({"n": 2})).await.unwrap();

        let value = store.get_context("last_sync").await.unwrap().unwrap();
        assert_eq!(value["n"], 2);
    }
}
