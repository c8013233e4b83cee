use thiserror::Error;

/// Error taxonomy for the concord runtime (spec.md §7).
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("llm error: {0}")]
    LlmError(String),

    #[error("tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("blocked: {0}")]
    Blocked(String),

    #[error("timeout waiting for response")]
    Timeout,

    #[error("corrupt state: {0}")]
    CorruptState(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AgentError {
    /// Errors that indicate a data-integrity risk: per spec.md §7 the owning
    /// agent loop must abort rather than translate these into a `*_result`.
    pub fn is_fatal_to_loop(&self) -> bool {
        matches!(self, AgentError::StoreUnavailable(_) | AgentError::CorruptState(_))
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::InvalidInput(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
