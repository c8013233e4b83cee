//! Executor: shell commands, file operations, and coding-assistant
//! delegation (spec.md §4.6).

use crate::collaborators::CodingAssistant;
use crate::dangerous;
use crate::event_loop::PeerAgent;
use async_trait::async_trait;
use concord_bus::MessageBus;
use concord_common::error::{AgentError, Result};
use concord_common::types::{message_types, now_iso, Message, TaskStatus};
use concord_store::StateStore;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, serde::Serialize)]
struct CommandRecord {
    command: String,
    cwd: Option<String>,
    return_code: i32,
    success: bool,
    timestamp: String,
}

pub struct ExecutorSettings {
    pub command_timeout: Duration,
    pub stdout_cap: usize,
    pub stderr_cap: usize,
    pub history_capacity: usize,
}

pub struct Executor {
    name: String,
    store: Arc<StateStore>,
    bus: Arc<MessageBus>,
    director: String,
    coding_assistant: Arc<dyn CodingAssistant>,
    settings: ExecutorSettings,
    history: Mutex<VecDeque<CommandRecord>>,
}

impl Executor {
    pub fn new(
        name: impl Into<String>,
        store: Arc<StateStore>,
        bus: Arc<MessageBus>,
        director: impl Into<String>,
        coding_assistant: Arc<dyn CodingAssistant>,
        settings: ExecutorSettings,
    ) -> Self {
        let capacity = settings.history_capacity;
        Self {
            name: name.into(),
            store,
            bus,
            director: director.into(),
            coding_assistant,
            settings,
            history: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    fn truncate(s: &str, cap: usize) -> (String, bool) {
        if s.len() <= cap {
            (s.to_string(), false)
        } else {
            (s.chars().take(cap).collect(), true)
        }
    }

    async fn record(&self, record: CommandRecord) {
        let mut history = self.history.lock().await;
        if history.len() == self.settings.history_capacity {
            history.pop_front();
        }
        history.push_back(record);
    }

    /// Runs a shell command after the dangerous-pattern check. A blocked
    /// command is never spawned (spec.md §4.6 scenario B).
    async fn execute_command(&self, command: &str, cwd: Option<&str>) -> Value {
        if let Some(reason) = dangerous::check(command) {
            warn!(agent = %self.name, command, "blocked dangerous command");
            self.record(CommandRecord {
                command: command.to_string(),
                cwd: cwd.map(str::to_string),
                return_code: -1,
                success: false,
                timestamp: now_iso(),
            })
            .await;
            return json!({
                "command": command, "cwd": cwd, "stdout": "", "stderr": reason,
                "return_code": -1, "success": false, "timestamp": now_iso(),
            });
        }

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).stdout(Stdio::piped()).stderr(Stdio::piped());
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }

        let outcome = async {
            let child = cmd.spawn().map_err(|e| AgentError::ToolUnavailable(e.to_string()))?;
            tokio::time::timeout(self.settings.command_timeout, child.wait_with_output())
                .await
                .map_err(|_| AgentError::Timeout)?
                .map_err(|e| AgentError::ToolUnavailable(e.to_string()))
        }
        .await;

        let timestamp = now_iso();
        match outcome {
            Ok(output) => {
                let (stdout, _) = Self::truncate(&String::from_utf8_lossy(&output.stdout), self.settings.stdout_cap);
                let (stderr, _) = Self::truncate(&String::from_utf8_lossy(&output.stderr), self.settings.stderr_cap);
                let return_code = output.status.code().unwrap_or(-1);
                let success = output.status.success();
                self.record(CommandRecord {
                    command: command.to_string(),
                    cwd: cwd.map(str::to_string),
                    return_code,
                    success,
                    timestamp: timestamp.clone(),
                })
                .await;
                json!({ "command": command, "cwd": cwd, "stdout": stdout, "stderr": stderr, "return_code": return_code, "success": success, "timestamp": timestamp })
            }
            Err(e) => {
                self.record(CommandRecord {
                    command: command.to_string(),
                    cwd: cwd.map(str::to_string),
                    return_code: -1,
                    success: false,
                    timestamp: timestamp.clone(),
                })
                .await;
                json!({ "command": command, "cwd": cwd, "stdout": "", "stderr": e.to_string(), "return_code": -1, "success": false, "timestamp": timestamp })
            }
        }
    }

    /// Handles create/edit/delete/read/copy/move per spec.md §4.6 exact
    /// per-operation semantics.
    async fn file_operation(&self, operation: &str, path: &str, content: Option<&str>, destination: Option<&str>) -> Result<Value> {
        match operation {
            "create" => {
                if let Some(parent) = Path::new(path).parent() {
                    fs::create_dir_all(parent).await?;
                }
                fs::write(path, content.unwrap_or_default()).await?;
                Ok(json!({ "success": true, "path": path }))
            }
            "edit" => {
                if fs::metadata(path).await.is_err() {
                    return Ok(json!({ "success": false, "error": format!("{path} does not exist") }));
                }
                fs::write(path, content.unwrap_or_default()).await?;
                Ok(json!({ "success": true, "path": path }))
            }
            "delete" => {
                let meta = fs::metadata(path).await?;
                if meta.is_dir() {
                    fs::remove_dir_all(path).await?;
                } else {
                    fs::remove_file(path).await?;
                }
                Ok(json!({ "success": true, "path": path }))
            }
            "read" => {
                const CAP: usize = 100_000;
                let bytes = fs::read(path).await?;
                let truncated = bytes.len() > CAP;
                let slice = if truncated { &bytes[..CAP] } else { &bytes[..] };
                Ok(json!({
                    "success": true,
                    "path": path,
                    "content": String::from_utf8_lossy(slice),
                    "truncated": truncated,
                }))
            }
            "copy" => {
                let destination = destination.ok_or_else(|| AgentError::InvalidInput("copy requires a destination".to_string()))?;
                if let Some(parent) = Path::new(destination).parent() {
                    fs::create_dir_all(parent).await?;
                }
                fs::copy(path, destination).await?;
                Ok(json!({ "success": true, "path": path, "destination": destination }))
            }
            "move" => {
                let destination = destination.ok_or_else(|| AgentError::InvalidInput("move requires a destination".to_string()))?;
                if let Some(parent) = Path::new(destination).parent() {
                    fs::create_dir_all(parent).await?;
                }
                fs::rename(path, destination).await?;
                Ok(json!({ "success": true, "path": path, "destination": destination }))
            }
            other => Ok(json!({ "success": false, "error": format!("unknown file operation: {other}") })),
        }
    }

    async fn handle_status(&self) -> Value {
        let history = self.history.lock().await;
        let recent: Vec<&CommandRecord> = history.iter().rev().take(10).collect();
        json!({ "recent_commands": recent })
    }

    /// Opportunistic idle-task pickup: claims the highest-priority oldest
    /// pending task, runs it through the coding assistant, and reports
    /// completion or a blocker back to the Director (spec.md §4.6).
    async fn pick_up_idle_task(&self) -> Result<()> {
        let mut pending = self.store.get_tasks(Some(TaskStatus::Pending)).await?;
        pending.sort_by_key(|t| (t.priority.rank(), t.created_at.clone()));
        let Some(task) = pending.into_iter().next() else { return Ok(()) };

        self.store.update_task_status(&task.id, TaskStatus::InProgress, Some(&self.name)).await?;

        let prompt = format!("{}\n\n{}", task.title, task.description);
        match self.coding_assistant.run(&prompt, None, false, self.settings.command_timeout).await {
            Ok(_output) => {
                self.store.update_task_status(&task.id, TaskStatus::Completed, Some(&self.name)).await?;
                self.bus.request_review(&self.name, &self.director, &task.id).await?;
            }
            Err(e) => {
                self.store.update_task_status(&task.id, TaskStatus::Blocked, Some(&self.name)).await?;
                self.bus.report_blocker(&self.name, &self.director, &format!("task {} blocked: {e}", task.id)).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PeerAgent for Executor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dispatch(&self, message: &Message) -> Result<()> {
        let body: Value = serde_json::from_str(&message.body).unwrap_or(Value::Null);

        let result = match message.msg_type.as_str() {
            message_types::EXECUTE_REQUEST => {
                let command = body.get("command").and_then(Value::as_str).unwrap_or_default();
                let cwd = body.get("cwd").and_then(Value::as_str);
                Some((message_types::EXECUTE_RESULT, self.execute_command(command, cwd).await))
            }
            message_types::FILE_REQUEST => {
                let operation = body.get("operation").and_then(Value::as_str).unwrap_or_default();
                let path = body.get("path").and_then(Value::as_str).unwrap_or_default();
                let content = body.get("content").and_then(Value::as_str);
                let destination = body.get("destination").and_then(Value::as_str);
                let payload = match self.file_operation(operation, path, content, destination).await {
                    Ok(payload) => payload,
                    Err(e) => json!({ "success": false, "error": e.to_string() }),
                };
                Some((message_types::FILE_COMPLETE, payload))
            }
            message_types::CLAUDE_CODE_REQUEST => {
                let prompt = body.get("prompt").and_then(Value::as_str).unwrap_or_default();
                let cwd = body.get("cwd").and_then(Value::as_str).map(Path::new);
                let allow_edits = body.get("allow_edits").and_then(Value::as_bool).unwrap_or(false);
                let timeout = body
                    .get("timeout")
                    .and_then(Value::as_u64)
                    .map(Duration::from_secs)
                    .unwrap_or(self.settings.command_timeout);
                let payload = match self.coding_assistant.run(prompt, cwd, allow_edits, timeout).await {
                    Ok(output) => json!({ "success": true, "output": output }),
                    Err(e) => json!({ "success": false, "error": e.to_string() }),
                };
                Some((message_types::CLAUDE_CODE_RESULT, payload))
            }
            message_types::STATUS_REQUEST => Some((message_types::STATUS_RESPONSE, self.handle_status().await)),
            other => {
                info!(agent = %self.name, msg_type = %other, "unrecognised message type acknowledged");
                None
            }
        };

        if let Some((result_type, payload)) = result {
            self.bus.send_result(&self.name, &message.from, result_type, &message.id, payload).await?;
        }
        Ok(())
    }

    async fn maintenance(&self) -> Result<()> {
        self.pick_up_idle_task().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_cap() {
        let (s, truncated) = Executor::truncate("hello world", 5);
        assert_eq!(s, "hello");
        assert!(truncated);

        let (s, truncated) = Executor::truncate("hi", 5);
        assert_eq!(s, "hi");
        assert!(!truncated);
    }
}
