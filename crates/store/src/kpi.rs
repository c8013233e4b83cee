use crate::StateStore;
use concord_common::error::{AgentError, Result};
use concord_common::types::{now_iso, KpiSample};
use sqlx::Row;

fn store_err(e: sqlx::Error) -> AgentError {
    AgentError::StoreUnavailable(e.to_string())
}

impl StateStore {
    pub async fn add_kpi_sample(&self, metric: &str, value: f64) -> Result<i64> {
        let result = sqlx::query("INSERT INTO kpi_samples (metric, value, timestamp) VALUES (?, ?, ?)")
            .bind(metric)
            .bind(value)
            .bind(now_iso())
            .execute(self.pool())
            .await
            .map_err(store_err)?;
        Ok(result.last_insert_rowid())
    }

    /// Newest-first samples for `metric`, capped at `limit` (spec.md §4.2).
    pub async fn get_kpi_history(&self, metric: &str, limit: i64) -> Result<Vec<KpiSample>> {
        let rows = sqlx::query("SELECT * FROM kpi_samples WHERE metric = ? ORDER BY timestamp DESC LIMIT ?")
            .bind(metric)
            .bind(limit)
            .fetch_all(self.pool())
            .await
            .map_err(store_err)?;
        rows.iter()
            .map(|row| {
                Ok(KpiSample {
                    id: row.try_get("id").map_err(store_err)?,
                    metric: row.try_get("metric").map_err(store_err)?,
                    value: row.try_get("value").map_err(store_err)?,
                    timestamp: row.try_get("timestamp").map_err(store_err)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn history_is_newest_first_and_bounded() {
        let store = StateStore::connect_in_memory().await.unwrap();
        for v in 0..5 {
            store.add_kpi_sample("latency_ms", v as f64).await.unwrap();
        }
        let history = store.get_kpi_history("latency_ms", 3).await.unwrap();
        assert_eq!(history.len(), 3);
        assert!(history[0].id > history[1].id);
    }
}
