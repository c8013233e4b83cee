//! Entity types for the concord data model (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Generates an opaque identifier for any entity that needs one.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// high=0, medium=1, low=2 — lower sorts first (spec.md §4.1).
    pub fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        };
        write!(f, "{s}")
    }
}

/// Message type taxonomy (spec.md §4.1). The type is a plain string on the
/// wire: "Any other type is accepted but ignored by peers," so the bus must
/// never reject or coerce an unrecognised type, only the known ones route
/// to a handler. The constants below name the closed set peers dispatch on.
pub mod message_types {
    pub const SEARCH_REQUEST: &str = "search_request";
    pub const INDEX_REQUEST: &str = "index_request";
    pub const EXECUTE_REQUEST: &str = "execute_request";
    pub const FILE_REQUEST: &str = "file_request";
    pub const KNOWLEDGE_REQUEST: &str = "knowledge_request";
    pub const STATUS_REQUEST: &str = "status_request";
    pub const CLAUDE_CODE_REQUEST: &str = "claude_code_request";

    pub const SEARCH_RESULT: &str = "search_result";
    pub const INDEX_COMPLETE: &str = "index_complete";
    pub const EXECUTE_RESULT: &str = "execute_result";
    pub const FILE_COMPLETE: &str = "file_complete";
    pub const KNOWLEDGE_RESULT: &str = "knowledge_result";
    pub const STATUS_RESPONSE: &str = "status_response";
    pub const CLAUDE_CODE_RESULT: &str = "claude_code_result";

    pub const DISCOVERY: &str = "discovery";
    pub const SUGGESTION: &str = "suggestion";
    pub const QUESTION: &str = "question";
    pub const BLOCKER: &str = "blocker";
    pub const REVIEW_REQUEST: &str = "review_request";
    pub const REVIEW_RESPONSE: &str = "review_response";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub msg_type: String,
    pub subject: String,
    pub body: String,
    pub priority: Priority,
    pub timestamp: String,
    pub read: bool,
    pub read_at: Option<String>,
    pub thread_id: String,
    pub reply_to: Option<String>,

    /// Additive fields a future writer might have set and this reader
    /// doesn't know about yet; preserved verbatim on round-trip.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub owner: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub due_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub level: AlertLevel,
    pub message: String,
    pub source: String,
    pub acknowledged: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub title: String,
    pub rationale: String,
    pub decision_maker: String,
    pub impact: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiSample {
    pub id: i64,
    pub metric: String,
    pub value: f64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingPrep {
    pub id: String,
    pub event_id: String,
    pub brief: String,
    pub created_by: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileIndexEntry {
    pub id: String,
    pub path: String,
    pub extension: String,
    pub size: i64,
    pub modified_at: String,
    pub indexed_at: String,
    pub summary: Option<String>,
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteType {
    Function,
    Class,
    Method,
    Endpoint,
    Handler,
    Struct,
    Interface,
    Property,
}

impl fmt::Display for RouteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeRoute {
    pub id: String,
    pub file_path: String,
    pub route_type: RouteType,
    pub name: String,
    pub line_number: i64,
    pub signature: String,
    pub docstring: String,
    pub keywords: BTreeSet<String>,
    pub indexed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discovery {
    pub id: String,
    pub agent: String,
    pub discovery_type: String,
    pub description: String,
    pub details: serde_json::Value,
    pub discovered_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRunState {
    Stopped,
    Running,
    Exploring,
    Routing,
    Busy,
}

impl fmt::Display for AgentRunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentRunState::Stopped => "stopped",
            AgentRunState::Running => "running",
            AgentRunState::Exploring => "exploring",
            AgentRunState::Routing => "routing",
            AgentRunState::Busy => "busy",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatusRow {
    pub agent_name: String,
    pub status: AgentRunState,
    pub last_heartbeat: String,
    pub current_task: Option<String>,
}

/// Relevance-decay setting for a journal entry (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelevanceDecay {
    Fast,
    Medium,
    Slow,
}

impl RelevanceDecay {
    pub fn rate(self) -> f64 {
        match self {
            RelevanceDecay::Fast => 0.1,
            RelevanceDecay::Medium => 0.05,
            RelevanceDecay::Slow => 0.01,
        }
    }
}

impl fmt::Display for RelevanceDecay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RelevanceDecay::Fast => "fast",
            RelevanceDecay::Medium => "medium",
            RelevanceDecay::Slow => "slow",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RelevanceDecay {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "fast" => Ok(RelevanceDecay::Fast),
            "medium" => Ok(RelevanceDecay::Medium),
            "slow" => Ok(RelevanceDecay::Slow),
            other => Err(format!("unknown relevance_decay: {other}")),
        }
    }
}

/// Journal entry header metadata, mirrored into the journal index
/// (spec.md §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalMetadata {
    pub filename: String,
    pub title: String,
    pub author: String,
    pub created_at: String,
    pub relevance_decay: RelevanceDecay,
    pub tags: Vec<String>,
}

/// A journal entry ranked by `retrieve` (spec.md §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedEntry {
    pub metadata: JournalMetadata,
    pub combined: f64,
    pub relevance: f64,
    pub recency: f64,
}
