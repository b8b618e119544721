//! Error types for the agent core.

use thiserror::Error;

/// Primary error type for all agent-core operations.
///
/// Tool failures and loop exhaustion are deliberately *not* represented here:
/// they are converted into conversation data (`ToolResult` content strings and
/// terminal `ChatResult`s) so the model can see and recover from them. Only
/// structural misuse and infrastructure faults surface as `AgentError`.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Session is closed")]
    SessionClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Client error: {0}")]
    Client(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("Planning error: {0}")]
    Planning(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Coarse error classification used by hosts to pick a recovery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Session,
    Io,
    Serialization,
    Client,
    Tool,
    Checkpoint,
    Planning,
    State,
}

impl AgentError {
    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::SessionClosed => ErrorCategory::Session,
            Self::Io(_) => ErrorCategory::Io,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Client(_) => ErrorCategory::Client,
            Self::ToolNotFound(_) | Self::ToolExecution { .. } => ErrorCategory::Tool,
            Self::CheckpointNotFound(_) => ErrorCategory::Checkpoint,
            Self::Planning(_) => ErrorCategory::Planning,
            Self::InvalidState(_) => ErrorCategory::State,
        }
    }

    /// Whether this error is potentially retryable.
    ///
    /// Session misuse and configuration errors are programming errors and
    /// never retryable; transport and disk faults may be transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Client | ErrorCategory::Io)
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, AgentError>;
