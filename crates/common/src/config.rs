//! Injected configuration (spec.md §9: "Treat all such values as injected
//! configuration; do not bake defaults."). `SystemConfig::load` is the only
//! place that reads from disk; everything downstream takes an owned or
//! borrowed `SystemConfig`/sub-config, never a global.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub project_root: PathBuf,
    pub store: StoreConfig,
    pub bus: BusConfig,
    pub journal: JournalConfig,
    pub scheduler: SchedulerConfig,
    pub director: DirectorConfig,
    pub librarian: LibrarianConfig,
    pub executor: ExecutorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub bus_path: PathBuf,
    pub lock_retry_attempts: u32,
    pub lock_retry_delay_ms: u64,
    pub cleanup_after_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    pub journal_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub tick_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorConfig {
    pub model: String,
    pub persona_prompt: String,
    pub wait_for_response_secs: u64,
    pub history_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibrarianConfig {
    pub model: String,
    pub persona_prompt: String,
    pub roots: Vec<PathBuf>,
    pub max_depth: usize,
    pub extensions: Vec<String>,
    pub skip_dirs: Vec<String>,
    pub per_extension_cap: usize,
    pub maintenance_every_ticks: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub model: String,
    pub persona_prompt: String,
    pub command_timeout_secs: u64,
    pub stdout_cap: usize,
    pub stderr_cap: usize,
    pub history_capacity: usize,
    pub claude_code_binary: PathBuf,
    pub maintenance_every_ticks: u32,
}

impl SystemConfig {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SystemConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_roundtrips_a_minimal_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
project_root = "."

[store]
database_path = "state.db"

[bus]
bus_path = "message_bus.json"
lock_retry_attempts = 5
lock_retry_delay_ms = 50
cleanup_after_days = 30

[journal]
journal_dir = "journal"

[scheduler]
tick_interval_ms = 1000

[director]
model = "test-model"
persona_prompt = "You are the Director."
wait_for_response_secs = 20
history_len = 20

[librarian]
model = "test-model"
persona_prompt = "You are the Librarian."
roots = ["."]
max_depth = 4
extensions = ["py", "js"]
skip_dirs = ["node_modules", ".git"]
per_extension_cap = 500
maintenance_every_ticks = 30

[executor]
model = "test-model"
persona_prompt = "You are the Executor."
command_timeout_secs = 60
stdout_cap = 10000
stderr_cap = 5000
history_capacity = 100
claude_code_binary = "claude"
maintenance_every_ticks = 30
"#,
        )
        .unwrap();

        let cfg = SystemConfig::load(&path).unwrap();
        assert_eq!(cfg.bus.cleanup_after_days, 30);
        assert_eq!(cfg.librarian.extensions, vec!["py", "js"]);
        assert_eq!(cfg.executor.stdout_cap, 10_000);
    }
}
