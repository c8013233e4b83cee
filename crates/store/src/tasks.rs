use crate::StateStore;
use concord_common::error::{AgentError, Result};
use concord_common::types::{new_id, now_iso, Priority, Task, TaskStatus};
use sqlx::Row;

fn status_str(s: TaskStatus) -> &'static str {
    match s {
        TaskStatus::Pending => "pending",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Completed => "completed",
        TaskStatus::Blocked => "blocked",
    }
}

fn status_from_str(s: &str) -> Result<TaskStatus> {
    match s {
        "pending" => Ok(TaskStatus::Pending),
        "in_progress" => Ok(TaskStatus::InProgress),
        "completed" => Ok(TaskStatus::Completed),
        "blocked" => Ok(TaskStatus::Blocked),
        other => Err(AgentError::CorruptState(format!("unknown task status: {other}"))),
    }
}

fn priority_str(p: Priority) -> &'static str {
    match p {
        Priority::High => "high",
        Priority::Medium => "medium",
        Priority::Low => "low",
    }
}

fn priority_from_str(s: &str) -> Result<Priority> {
    match s {
        "high" => Ok(Priority::High),
        "medium" => Ok(Priority::Medium),
        "low" => Ok(Priority::Low),
        other => Err(AgentError::CorruptState(format!("unknown priority: {other}"))),
    }
}

fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<Task> {
    Ok(Task {
        id: row.try_get("id").map_err(store_err)?,
        title: row.try_get("title").map_err(store_err)?,
        description: row.try_get("description").map_err(store_err)?,
        owner: row.try_get("owner").map_err(store_err)?,
        status: status_from_str(&row.try_get::<String, _>("status").map_err(store_err)?)?,
        priority: priority_from_str(&row.try_get::<String, _>("priority").map_err(store_err)?)?,
        due_date: row.try_get("due_date").map_err(store_err)?,
        created_at: row.try_get("created_at").map_err(store_err)?,
        updated_at: row.try_get("updated_at").map_err(store_err)?,
    })
}

fn store_err(e: sqlx::Error) -> AgentError {
    AgentError::StoreUnavailable(e.to_string())
}

impl StateStore {
    pub async fn add_task(
        &self,
        title: &str,
        description: &str,
        owner: &str,
        priority: Priority,
        due_date: Option<&str>,
    ) -> Result<String> {
        let id = new_id();
        let now = now_iso();
        sqlx::query(
            "INSERT INTO tasks (id, title, description, owner, status, priority, due_date, created_at, updated_at)
             VALUES (?, ?, ?, ?, 'pending', ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(title)
        .bind(description)
        .bind(owner)
        .bind(priority_str(priority))
        .bind(due_date)
        .bind(&now)
        .bind(&now)
        .execute(self.pool())
        .await
        .map_err(store_err)?;
        Ok(id)
    }

    /// Newest-first; filters to an exact status when given (spec.md §4.2).
    pub async fn get_tasks(&self, status: Option<TaskStatus>) -> Result<Vec<Task>> {
        let rows = match status {
            Some(s) => sqlx::query("SELECT * FROM tasks WHERE status = ? ORDER BY created_at DESC")
                .bind(status_str(s))
                .fetch_all(self.pool())
                .await
                .map_err(store_err)?,
            None => sqlx::query("SELECT * FROM tasks ORDER BY created_at DESC")
                .fetch_all(self.pool())
                .await
                .map_err(store_err)?,
        };
        rows.iter().map(row_to_task).collect()
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(store_err)?;
        row.as_ref().map(row_to_task).transpose()
    }

    /// Updates status/owner; `updated_at` is refreshed to now, which keeps it
    /// monotonically non-decreasing as spec.md §3 requires. The store itself
    /// does not reject any transition — application code is responsible for
    /// never driving `completed` back to `pending` (spec.md property 8).
    pub async fn update_task_status(&self, id: &str, status: TaskStatus, owner: Option<&str>) -> Result<()> {
        let now = now_iso();
        let result = match owner {
            Some(owner) => sqlx::query("UPDATE tasks SET status = ?, owner = ?, updated_at = ? WHERE id = ?")
                .bind(status_str(status))
                .bind(owner)
                .bind(&now)
                .bind(id)
                .execute(self.pool())
                .await
                .map_err(store_err)?,
            None => sqlx::query("UPDATE tasks SET status = ?, updated_at = ? WHERE id = ?")
                .bind(status_str(status))
                .bind(&now)
                .bind(id)
                .execute(self.pool())
                .await
                .map_err(store_err)?,
        };
        if result.rows_affected() == 0 {
            return Err(AgentError::NotFound(format!("task {id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tasks_are_returned_newest_first_and_filterable() {
        let store = StateStore::connect_in_memory().await.unwrap();
        let a = store.add_task("a", "d", "director", Priority::Medium, None).await.unwrap();
        let b = store.add_task("b", "d", "director", Priority::High, None).await.unwrap();
        store.update_task_status(&b, TaskStatus::InProgress, Some("executor")).await.unwrap();

        let all = store.get_tasks(None).await.unwrap();
        assert_eq!(all.len(), 2);

        let in_progress = store.get_tasks(Some(TaskStatus::InProgress)).await.unwrap();
        assert_eq!(in_progress.len(), 1);
        assert_eq!(in_progress[0].id, b);

        let pending = store.get_tasks(Some(TaskStatus::Pending)).await.unwrap();
        assert_eq!(pending[0].id, a);
    }

    #[tokio::test]
    async fn updating_unknown_task_is_not_found() {
        let store = StateStore::connect_in_memory().await.unwrap();
        let err = store.update_task_status("nope", TaskStatus::Completed, None).await.unwrap_err();
        assert!(matches!(err, AgentError::NotFound(_)));
    }
}
