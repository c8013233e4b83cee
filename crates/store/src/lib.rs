//! Shared state store (spec.md §4.2): a single embedded SQLite database per
//! process, multi-threaded access serialised by `sqlx`'s pool. Every writer
//! commits before returning success; there are no deferred writes, and every
//! engine error is surfaced to the caller rather than retried (spec.md §4.2
//! failure model).

mod agent_status;
mod alerts;
mod code_routes;
mod context;
mod decisions;
mod discovery;
mod file_index;
mod kpi;
mod meeting_prep;
mod tasks;

use concord_common::error::{AgentError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub use agent_status::*;
pub use alerts::*;
pub use code_routes::*;
pub use context::*;
pub use decisions::*;
pub use discovery::*;
pub use file_index::*;
pub use kpi::*;
pub use meeting_prep::*;
pub use tasks::*;

#[derive(Clone)]
pub struct StateStore {
    pool: SqlitePool,
}

impl StateStore {
    pub async fn connect(database_path: &Path) -> Result<Self> {
        if let Some(parent) = database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", database_path.display()))
            .map_err(|e| AgentError::StoreUnavailable(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|e| AgentError::StoreUnavailable(e.to_string()))?;

        let store = Self { pool };
        store.migrate().await?;
        info!(path = %database_path.display(), "state store ready");
        Ok(store)
    }

    #[cfg(test)]
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| AgentError::StoreUnavailable(e.to_string()))?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        const STATEMENTS: &[&str] = &[
            "CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                owner TEXT NOT NULL,
                status TEXT NOT NULL,
                priority TEXT NOT NULL,
                due_date TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                source TEXT NOT NULL,
                acknowledged INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS decisions (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                rationale TEXT NOT NULL,
                decision_maker TEXT NOT NULL,
                impact TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS kpi_samples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                metric TEXT NOT NULL,
                value REAL NOT NULL,
                timestamp TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS context_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS meeting_preps (
                id TEXT PRIMARY KEY,
                event_id TEXT NOT NULL,
                brief TEXT NOT NULL,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_meeting_preps_event ON meeting_preps(event_id, created_at)",
            "CREATE TABLE IF NOT EXISTS file_index (
                id TEXT PRIMARY KEY,
                path TEXT NOT NULL UNIQUE,
                extension TEXT NOT NULL,
                size INTEGER NOT NULL,
                modified_at TEXT NOT NULL,
                indexed_at TEXT NOT NULL,
                summary TEXT,
                tags TEXT NOT NULL DEFAULT '[]'
            )",
            "CREATE TABLE IF NOT EXISTS code_routes (
                id TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                route_type TEXT NOT NULL,
                name TEXT NOT NULL,
                line_number INTEGER NOT NULL,
                signature TEXT NOT NULL,
                docstring TEXT NOT NULL,
                keywords TEXT NOT NULL DEFAULT '[]',
                indexed_at TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_code_routes_file ON code_routes(file_path)",
            "CREATE TABLE IF NOT EXISTS agent_status (
                agent_name TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                last_heartbeat TEXT NOT NULL,
                current_task TEXT
            )",
            "CREATE TABLE IF NOT EXISTS discoveries (
                id TEXT PRIMARY KEY,
                agent TEXT NOT NULL,
                discovery_type TEXT NOT NULL,
                description TEXT NOT NULL,
                details TEXT NOT NULL,
                discovered_at TEXT NOT NULL
            )",
        ];

        for stmt in STATEMENTS {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| AgentError::StoreUnavailable(e.to_string()))?;
        }
        Ok(())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
