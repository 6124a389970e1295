use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version this crate speaks. Validation requires an exact match,
/// not a SemVer-range match.
pub const PROTOCOL_VERSION: &str = crate::constants::PROTOCOL_VERSION;

/// A validated message: the envelope fields common to every message, plus
/// the variant-specific payload.
///
/// Construct only via [`crate::protocol::validate`] — there is no public
/// constructor that skips validation, so every `Message` in the system is
/// known-valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub timestamp: i64,
    pub sender: String,
    pub receiver: String,
    #[serde(rename = "correlationId")]
    pub correlation_id: String,
    pub version: String,
    #[serde(flatten)]
    pub payload: MessagePayload,
}

/// Variant-specific fields, tagged by the wire `type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessagePayload {
    #[serde(rename = "heartbeat")]
    Heartbeat {
        status: String,
        #[serde(rename = "lastHealthCheck")]
        last_health_check: i64,
    },
    #[serde(rename = "status_update")]
    StatusUpdate { status: String },
    #[serde(rename = "error")]
    Error { error: String, code: String },
    #[serde(rename = "task_assign")]
    TaskAssign {
        #[serde(rename = "taskId")]
        task_id: String,
        #[serde(rename = "taskType")]
        task_type: String,
        parameters: Value,
        priority: i64,
        timeout: i64,
    },
    #[serde(rename = "task_complete")]
    TaskComplete {
        #[serde(rename = "taskId")]
        task_id: String,
        result: Value,
        duration: f64,
    },
    #[serde(rename = "task_fail")]
    TaskFail {
        #[serde(rename = "taskId")]
        task_id: String,
        error: String,
        code: String,
    },
    #[serde(rename = "task_progress")]
    TaskProgress {
        #[serde(rename = "taskId")]
        task_id: String,
        progress: f64,
        status: String,
    },
    #[serde(rename = "tool_request")]
    ToolRequest {
        #[serde(rename = "toolId")]
        tool_id: String,
        version: String,
        parameters: Value,
        timeout: i64,
    },
    #[serde(rename = "tool_response")]
    ToolResponse {
        #[serde(rename = "toolId")]
        tool_id: String,
        result: Value,
        duration: f64,
    },
    #[serde(rename = "tool_error")]
    ToolError {
        #[serde(rename = "toolId")]
        tool_id: String,
        error: String,
        code: String,
    },
    #[serde(rename = "a2a_message")]
    A2aMessage { content: Value, metadata: Value },
    #[serde(rename = "a2a_state_sync")]
    A2aStateSync {
        state: Value,
        #[serde(rename = "stateTimestamp")]
        state_timestamp: i64,
    },
}

impl MessagePayload {
    /// The wire `type` discriminator for this variant.
    pub fn type_name(&self) -> &'static str {
        match self {
            MessagePayload::Heartbeat { .. } => "heartbeat",
            MessagePayload::StatusUpdate { .. } => "status_update",
            MessagePayload::Error { .. } => "error",
            MessagePayload::TaskAssign { .. } => "task_assign",
            MessagePayload::TaskComplete { .. } => "task_complete",
            MessagePayload::TaskFail { .. } => "task_fail",
            MessagePayload::TaskProgress { .. } => "task_progress",
            MessagePayload::ToolRequest { .. } => "tool_request",
            MessagePayload::ToolResponse { .. } => "tool_response",
            MessagePayload::ToolError { .. } => "tool_error",
            MessagePayload::A2aMessage { .. } => "a2a_message",
            MessagePayload::A2aStateSync { .. } => "a2a_state_sync",
        }
    }
}

impl Message {
    pub fn type_name(&self) -> &'static str {
        self.payload.type_name()
    }
}
