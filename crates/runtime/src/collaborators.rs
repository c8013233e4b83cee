//! External collaborator contracts the core treats as opaque (spec.md §6).
//! Auth and refresh for the calendar collaborator are out of scope; the
//! null implementation here is the default until a real one is wired in.

use async_trait::async_trait;
use concord_common::error::{AgentError, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// `LLM.complete(model, system_prompt, messages, max_tokens, temperature) -> text`.
/// Failures propagate as `LlmError` (spec.md §6).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String>;
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Attendee {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub subject: String,
    pub start: String,
    pub end: String,
    pub location: String,
    pub organizer: String,
    pub attendees: Vec<Attendee>,
    pub is_online: bool,
    pub body_preview: String,
}

#[async_trait]
pub trait CalendarClient: Send + Sync {
    async fn get_events_today(&self) -> Result<Vec<CalendarEvent>>;
    async fn get_upcoming_events(&self, minutes: i64) -> Result<Vec<CalendarEvent>>;
    async fn get_event_details(&self, id: &str) -> Result<CalendarEvent>;
}

/// Default calendar collaborator when no real account is wired in: every
/// query returns empty/`NotFound` rather than failing the agent loop.
pub struct NullCalendarClient;

#[async_trait]
impl CalendarClient for NullCalendarClient {
    async fn get_events_today(&self) -> Result<Vec<CalendarEvent>> {
        Ok(Vec::new())
    }

    async fn get_upcoming_events(&self, _minutes: i64) -> Result<Vec<CalendarEvent>> {
        Ok(Vec::new())
    }

    async fn get_event_details(&self, id: &str) -> Result<CalendarEvent> {
        Err(AgentError::NotFound(format!("calendar event {id}")))
    }
}

/// Invoked as a child process with `["--print", prompt]`, optionally plus
/// `"--dangerously-skip-permissions"` (spec.md §6). Absence of the binary is
/// a recoverable `ToolUnavailable`, never a panic.
#[async_trait]
pub trait CodingAssistant: Send + Sync {
    async fn run(&self, prompt: &str, cwd: Option<&Path>, allow_edits: bool, timeout: Duration) -> Result<String>;
}

pub struct ProcessCodingAssistant {
    pub binary: String,
}

impl ProcessCodingAssistant {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait]
impl CodingAssistant for ProcessCodingAssistant {
    async fn run(&self, prompt: &str, cwd: Option<&Path>, allow_edits: bool, timeout: Duration) -> Result<String> {
        let mut command = Command::new(&self.binary);
        command.arg("--print").arg(prompt);
        if allow_edits {
            command.arg("--dangerously-skip-permissions");
        }
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }
        command.stdout(Stdio::piped()).stderr(Stdio::piped());

        let child = command
            .spawn()
            .map_err(|e| AgentError::ToolUnavailable(format!("{}: {e}", self.binary)))?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| AgentError::Timeout)?
            .map_err(|e| AgentError::ToolUnavailable(format!("{}: {e}", self.binary)))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(AgentError::InvalidInput(String::from_utf8_lossy(&output.stderr).to_string()))
        }
    }
}
