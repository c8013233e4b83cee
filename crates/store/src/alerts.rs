use crate::StateStore;
use concord_common::error::{AgentError, Result};
use concord_common::types::{new_id, now_iso, Alert, AlertLevel};
use sqlx::Row;

fn level_str(l: AlertLevel) -> &'static str {
    match l {
        AlertLevel::Info => "info",
        AlertLevel::Warning => "warning",
        AlertLevel::Critical => "critical",
    }
}

fn level_from_str(s: &str) -> Result<AlertLevel> {
    match s {
        "info" => Ok(AlertLevel::Info),
        "warning" => Ok(AlertLevel::Warning),
        "critical" => Ok(AlertLevel::Critical),
        other => Err(AgentError::CorruptState(format!("unknown alert level: {other}"))),
    }
}

fn store_err(e: sqlx::Error) -> AgentError {
    AgentError::StoreUnavailable(e.to_string())
}

fn row_to_alert(row: &sqlx::sqlite::SqliteRow) -> Result<Alert> {
    Ok(Alert {
        id: row.try_get("id").map_err(store_err)?,
        level: level_from_str(&row.try_get::<String, _>("level").map_err(store_err)?)?,
        message: row.try_get("message").map_err(store_err)?,
        source: row.try_get("source").map_err(store_err)?,
        acknowledged: row.try_get::<i64, _>("acknowledged").map_err(store_err)? != 0,
        created_at: row.try_get("created_at").map_err(store_err)?,
    })
}

impl StateStore {
    pub async fn add_alert(&self, level: AlertLevel, message: &str, source: &str) -> Result<String> {
        let id = new_id();
        sqlx::query(
            "INSERT INTO alerts (id, level, message, source, acknowledged, created_at) VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(&id)
        .bind(level_str(level))
        .bind(message)
        .bind(source)
        .bind(now_iso())
        .execute(self.pool())
        .await
        .map_err(store_err)?;
        Ok(id)
    }

    pub async fn get_alerts(&self, level: Option<AlertLevel>, acknowledged: Option<bool>) -> Result<Vec<Alert>> {
        let mut sql = String::from("SELECT * FROM alerts WHERE 1=1");
        if level.is_some() {
            sql.push_str(" AND level = ?");
        }
        if acknowledged.is_some() {
            sql.push_str(" AND acknowledged = ?");
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut query = sqlx::query(&sql);
        if let Some(l) = level {
            query = query.bind(level_str(l));
        }
        if let Some(a) = acknowledged {
            query = query.bind(if a { 1 } else { 0 });
        }
        let rows = query.fetch_all(self.pool()).await.map_err(store_err)?;
        rows.iter().map(row_to_alert).collect()
    }

    /// Once acknowledged, an alert stays acknowledged (spec.md §3 monotonic).
    pub async fn acknowledge_alert(&self, id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE alerts SET acknowledged = 1 WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(store_err)?;
        if result.rows_affected() == 0 {
            return Err(AgentError::NotFound(format!("alert {id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acknowledge_is_monotonic() {
        let store = StateStore::connect_in_memory().await.unwrap();
        let id = store.add_alert(AlertLevel::Critical, "disk full", "executor").await.unwrap();
        store.acknowledge_alert(&id).await.unwrap();
        store.acknowledge_alert(&id).await.unwrap();

        let unacked = store.get_alerts(None, Some(false)).await.unwrap();
        assert!(unacked.is_empty());
        let acked = store.get_alerts(Some(AlertLevel::Critical), Some(true)).await.unwrap();
        assert_eq!(acked.len(), 1);
    }
}
