use crate::StateStore;
use concord_common::error::{AgentError, Result};
use concord_common::types::{new_id, now_iso, Discovery};
use sqlx::Row;

fn store_err(e: sqlx::Error) -> AgentError {
    AgentError::StoreUnavailable(e.to_string())
}

impl StateStore {
    /// Append-only (spec.md §3).
    pub async fn add_discovery(&self, agent: &str, discovery_type: &str, description: &str, details: &serde_json::Value) -> Result<String> {
        let id = new_id();
        sqlx::query(
            "INSERT INTO discoveries (id, agent, discovery_type, description, details, discovered_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(agent)
        .bind(discovery_type)
        .bind(description)
        .bind(serde_json::to_string(details)?)
        .bind(now_iso())
        .execute(self.pool())
        .await
        .map_err(store_err)?;
        Ok(id)
    }

    pub async fn get_recent_discoveries(&self, limit: i64) -> Result<Vec<Discovery>> {
        let rows = sqlx::query("SELECT * FROM discoveries ORDER BY discovered_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(self.pool())
            .await
            .map_err(store_err)?;
        rows.iter()
            .map(|row| {
                let details_raw: String = row.try_get("details").map_err(store_err)?;
                Ok(Discovery {
                    id: row.try_get("id").map_err(store_err)?,
                    agent: row.try_get("agent").map_err(store_err)?,
                    discovery_type: row.try_get("discovery_type").map_err(store_err)?,
                    description: row.try_get("description").map_err(store_err)?,
                    details: serde_json::from_str(&details_raw)?,
                    discovered_at: row.try_get("discovered_at").map_err(store_err)?,
                })
            })
            .collect()
    }
}
