use thiserror::Error;

/// Convenience type alias for Results with [`AgentflowError`]
pub type Result<T> = std::result::Result<T, AgentflowError>;

/// Error codes carried in ERROR frames (protocol) and HTTP error bodies (API),
/// per the external interface catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorCode {
    InternalError,
    Timeout,
    InvalidMessage,
    VersionMismatch,
    AgentNotFound,
    AgentBusy,
    AgentError,
    TaskNotFound,
    TaskTimeout,
    TaskFailed,
    ToolNotFound,
    ToolError,
    ToolTimeout,
    A2aConnectionError,
    A2aSyncError,
    MessageHandlingError,
    MessageConversionError,
    RoutingError,
    NoAgentsFound,
    QueueFull,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::InvalidMessage => "INVALID_MESSAGE",
            ErrorCode::VersionMismatch => "VERSION_MISMATCH",
            ErrorCode::AgentNotFound => "AGENT_NOT_FOUND",
            ErrorCode::AgentBusy => "AGENT_BUSY",
            ErrorCode::AgentError => "AGENT_ERROR",
            ErrorCode::TaskNotFound => "TASK_NOT_FOUND",
            ErrorCode::TaskTimeout => "TASK_TIMEOUT",
            ErrorCode::TaskFailed => "TASK_FAILED",
            ErrorCode::ToolNotFound => "TOOL_NOT_FOUND",
            ErrorCode::ToolError => "TOOL_ERROR",
            ErrorCode::ToolTimeout => "TOOL_TIMEOUT",
            ErrorCode::A2aConnectionError => "A2A_CONNECTION_ERROR",
            ErrorCode::A2aSyncError => "A2A_SYNC_ERROR",
            ErrorCode::MessageHandlingError => "MESSAGE_HANDLING_ERROR",
            ErrorCode::MessageConversionError => "MESSAGE_CONVERSION_ERROR",
            ErrorCode::RoutingError => "ROUTING_ERROR",
            ErrorCode::NoAgentsFound => "NO_AGENTS_FOUND",
            ErrorCode::QueueFull => "QUEUE_FULL",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for agentflow-core.
///
/// Each variant maps to one kind in the error taxonomy (validation,
/// transport-transient, storage-transient, capacity, lifecycle misuse,
/// timeout) and to an [`ErrorCode`] via [`AgentflowError::code`].
#[derive(Error, Debug)]
pub enum AgentflowError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Protocol version mismatch: {0}")]
    VersionMismatch(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Queue is full (max: {max})")]
    QueueFull { max: usize },

    #[error("Agent error: {message}")]
    Agent { message: String },

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent busy: {0}")]
    AgentBusy(String),

    #[error("Tool error: {message}")]
    Tool { message: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Task error: {task_id} - {message}")]
    TaskExecution { task_id: String, message: String },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Routing error: {0}")]
    Routing(String),

    #[error("Timeout after {ms}ms: {message}")]
    Timeout { ms: u64, message: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AgentflowError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AgentflowError::Validation(_) => ErrorCode::InvalidMessage,
            AgentflowError::VersionMismatch(_) => ErrorCode::VersionMismatch,
            AgentflowError::Transport(_) => ErrorCode::MessageHandlingError,
            AgentflowError::Storage(_) => ErrorCode::InternalError,
            AgentflowError::QueueFull { .. } => ErrorCode::QueueFull,
            AgentflowError::Agent { .. } => ErrorCode::AgentError,
            AgentflowError::AgentNotFound(_) => ErrorCode::AgentNotFound,
            AgentflowError::AgentBusy(_) => ErrorCode::AgentBusy,
            AgentflowError::Tool { .. } => ErrorCode::ToolError,
            AgentflowError::ToolNotFound(_) => ErrorCode::ToolNotFound,
            AgentflowError::TaskExecution { .. } => ErrorCode::TaskFailed,
            AgentflowError::TaskNotFound(_) => ErrorCode::TaskNotFound,
            AgentflowError::Routing(_) => ErrorCode::RoutingError,
            AgentflowError::Timeout { .. } => ErrorCode::Timeout,
            AgentflowError::Configuration(_) => ErrorCode::InternalError,
            AgentflowError::Serialization(_) => ErrorCode::MessageConversionError,
            AgentflowError::Internal(_) => ErrorCode::InternalError,
        }
    }
}
