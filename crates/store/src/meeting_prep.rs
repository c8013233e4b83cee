use crate::StateStore;
use concord_common::error::{AgentError, Result};
use concord_common::types::{new_id, now_iso, MeetingPrep};
use sqlx::Row;

fn store_err(e: sqlx::Error) -> AgentError {
    AgentError::StoreUnavailable(e.to_string())
}

impl StateStore {
    pub async fn add_meeting_prep(&self, event_id: &str, brief: &str, created_by: &str) -> Result<String> {
        let id = new_id();
        sqlx::query("INSERT INTO meeting_preps (id, event_id, brief, created_by, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(&id)
            .bind(event_id)
            .bind(brief)
            .bind(created_by)
            .bind(now_iso())
            .execute(self.pool())
            .await
            .map_err(store_err)?;
        Ok(id)
    }

    /// Most-recent per `event_id` wins at read time (spec.md §3).
    pub async fn get_meeting_prep(&self, event_id: &str) -> Result<Option<MeetingPrep>> {
        let row = sqlx::query("SELECT * FROM meeting_preps WHERE event_id = ? ORDER BY created_at DESC LIMIT 1")
            .bind(event_id)
            .fetch_optional(self.pool())
            .await
            .map_err(store_err)?;
        row.map(|row| {
            Ok(MeetingPrep {
                id: row.try_get("id").map_err(store_err)?,
                event_id: row.try_get("event_id").map_err(store_err)?,
                brief: row.try_get("brief").map_err(store_err)?,
                created_by: row.try_get("created_by").map_err(store_err)?,
                created_at: row.try_get("created_at").map_err(store_err)?,
            })
        })
        .transpose()
    }
}
