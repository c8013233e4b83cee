use crate::StateStore;
use concord_common::error::{AgentError, Result};
use concord_common::types::{now_iso, AgentRunState, AgentStatusRow};
use sqlx::Row;

fn store_err(e: sqlx::Error) -> AgentError {
    AgentError::StoreUnavailable(e.to_string())
}

fn state_str(s: AgentRunState) -> &'static str {
    match s {
        AgentRunState::Stopped => "stopped",
        AgentRunState::Running => "running",
        AgentRunState::Exploring => "exploring",
        AgentRunState::Routing => "routing",
        AgentRunState::Busy => "busy",
    }
}

fn state_from_str(s: &str) -> Result<AgentRunState> {
    match s {
        "stopped" => Ok(AgentRunState::Stopped),
        "running" => Ok(AgentRunState::Running),
        "exploring" => Ok(AgentRunState::Exploring),
        "routing" => Ok(AgentRunState::Routing),
        "busy" => Ok(AgentRunState::Busy),
        other => Err(AgentError::CorruptState(format!("unknown agent state: {other}"))),
    }
}

fn row_to_status(row: &sqlx::sqlite::SqliteRow) -> Result<AgentStatusRow> {
    Ok(AgentStatusRow {
        agent_name: row.try_get("agent_name").map_err(store_err)?,
        status: state_from_str(&row.try_get::<String, _>("status").map_err(store_err)?)?,
        last_heartbeat: row.try_get("last_heartbeat").map_err(store_err)?,
        current_task: row.try_get("current_task").map_err(store_err)?,
    })
}

impl StateStore {
    /// Upsert; refreshes the heartbeat (spec.md §4.2).
    pub async fn update_agent_status(&self, name: &str, status: AgentRunState, current_task: Option<&str>) -> Result<()> {
        sqlx::query(
            "INSERT INTO agent_status (agent_name, status, last_heartbeat, current_task) VALUES (?, ?, ?, ?)
             ON CONFLICT(agent_name) DO UPDATE SET status = excluded.status, last_heartbeat = excluded.last_heartbeat, current_task = excluded.current_task",
        )
        .bind(name)
        .bind(state_str(status))
        .bind(now_iso())
        .bind(current_task)
        .execute(self.pool())
        .await
        .map_err(store_err)?;
        Ok(())
    }

    /// Updates `last_heartbeat` only, leaving status and task untouched.
    pub async fn agent_heartbeat(&self, name: &str) -> Result<()> {
        let result = sqlx::query("UPDATE agent_status SET last_heartbeat = ? WHERE agent_name = ?")
            .bind(now_iso())
            .bind(name)
            .execute(self.pool())
            .await
            .map_err(store_err)?;
        if result.rows_affected() == 0 {
            // First heartbeat for an agent that hasn't published a status yet.
            self.update_agent_status(name, AgentRunState::Running, None).await?;
        }
        Ok(())
    }

    pub async fn get_agent_status(&self, name: &str) -> Result<Option<AgentStatusRow>> {
        let row = sqlx::query("SELECT * FROM agent_status WHERE agent_name = ?")
            .bind(name)
            .fetch_optional(self.pool())
            .await
            .map_err(store_err)?;
        row.as_ref().map(row_to_status).transpose()
    }

    pub async fn get_all_agent_statuses(&self) -> Result<Vec<AgentStatusRow>> {
        let rows = sqlx::query("SELECT * FROM agent_status ORDER BY agent_name ASC")
            .fetch_all(self.pool())
            .await
            .map_err(store_err)?;
        rows.iter().map(row_to_status).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn update_agent_status_is_upsert() {
        let store = StateStore::connect_in_memory().await.unwrap();
        store.update_agent_status("librarian", AgentRunState::Exploring, Some("indexing /tmp")).await.unwrap();
        store.update_agent_status("librarian", AgentRunState::Running, None).await.unwrap();

        let status = store.get_agent_status("librarian").await.unwrap().unwrap();
        assert_eq!(status.status, AgentRunState::Running);
        assert_eq!(status.current_task, None);
    }

    #[tokio::test]
    async fn heartbeat_only_updates_last_heartbeat() {
        let store = StateStore::connect_in_memory().await.unwrap();
        store.update_agent_status("executor", AgentRunState::Busy, Some("task-1")).await.unwrap();
        store.agent_heartbeat("executor").await.unwrap();

        let status = store.get_agent_status("executor").await.unwrap().unwrap();
        assert_eq!(status.status, AgentRunState::Busy);
        assert_eq!(status.current_task.as_deref(), Some("task-1"));
    }
}
