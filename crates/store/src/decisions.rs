use crate::StateStore;
use concord_common::error::{AgentError, Result};
use concord_common::types::{new_id, now_iso, Decision};
use sqlx::Row;

fn store_err(e: sqlx::Error) -> AgentError {
    AgentError::StoreUnavailable(e.to_string())
}

fn row_to_decision(row: &sqlx::sqlite::SqliteRow) -> Result<Decision> {
    Ok(Decision {
        id: row.try_get("id").map_err(store_err)?,
        title: row.try_get("title").map_err(store_err)?,
        rationale: row.try_get("rationale").map_err(store_err)?,
        decision_maker: row.try_get("decision_maker").map_err(store_err)?,
        impact: row.try_get("impact").map_err(store_err)?,
        created_at: row.try_get("created_at").map_err(store_err)?,
    })
}

impl StateStore {
    /// Append-only (spec.md §3): there is no update or delete path.
    pub async fn add_decision(&self, title: &str, rationale: &str, decision_maker: &str, impact: &str) -> Result<String> {
        let id = new_id();
        sqlx::query(
            "INSERT INTO decisions (id, title, rationale, decision_maker, impact, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(title)
        .bind(rationale)
        .bind(decision_maker)
        .bind(impact)
        .bind(now_iso())
        .execute(self.pool())
        .await
        .map_err(store_err)?;
        Ok(id)
    }

    pub async fn get_decisions(&self, limit: i64) -> Result<Vec<Decision>> {
        let rows = sqlx::query("SELECT * FROM decisions ORDER BY created_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(self.pool())
            .await
            .map_err(store_err)?;
        rows.iter().map(row_to_decision).collect()
    }
}
