use super::envelope::{Message, MessagePayload, PROTOCOL_VERSION};
use crate::error::{AgentflowError, Result};
use serde_json::Value;

const KNOWN_TYPES: &[&str] = &[
    "heartbeat",
    "status_update",
    "error",
    "task_assign",
    "task_complete",
    "task_fail",
    "task_progress",
    "tool_request",
    "tool_response",
    "tool_error",
    "a2a_message",
    "a2a_state_sync",
];

fn invalid(message: impl Into<String>) -> AgentflowError {
    AgentflowError::Validation(message.into())
}

fn non_empty_string(raw: &Value, field: &str) -> Result<String> {
    match raw.get(field).and_then(Value::as_str) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(invalid(format!("Invalid message: missing or empty '{field}'"))),
    }
}

fn require_number(raw: &Value, field: &str, context: &str) -> Result<f64> {
    raw.get(field)
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite())
        .ok_or_else(|| invalid(format!("Invalid {context} message: '{field}' must be a number")))
}

fn require_string(raw: &Value, field: &str, context: &str) -> Result<String> {
    raw.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| invalid(format!("Invalid {context} message: missing '{field}'")))
}

fn require_any(raw: &Value, field: &str, context: &str) -> Result<Value> {
    raw.get(field)
        .cloned()
        .ok_or_else(|| invalid(format!("Invalid {context} message: missing '{field}'")))
}

/// Validate a raw JSON value against the message envelope protocol.
///
/// Checks run in order and short-circuit: envelope shape, protocol version,
/// envelope field types, then a per-variant presence check dispatched on
/// `type`. Any failure returns [`AgentflowError::Validation`] (code
/// `INVALID_MESSAGE`) except a version mismatch, which returns
/// [`AgentflowError::VersionMismatch`] (code `VERSION_MISMATCH`).
pub fn validate(raw: &Value) -> Result<Message> {
    let obj = raw
        .as_object()
        .ok_or_else(|| invalid("Invalid message: expected a JSON object"))?;

    let type_name = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("Invalid message: missing 'type'"))?;

    let version = obj
        .get("version")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("Invalid message: missing 'version'"))?;

    if version != PROTOCOL_VERSION {
        return Err(AgentflowError::VersionMismatch(format!(
            "Protocol version mismatch: expected {PROTOCOL_VERSION}, got {version}"
        )));
    }

    if !KNOWN_TYPES.contains(&type_name) {
        return Err(invalid(format!("Invalid message: unknown type '{type_name}'")));
    }

    let timestamp = raw
        .get("timestamp")
        .and_then(Value::as_i64)
        .filter(|t| *t > 0)
        .ok_or_else(|| invalid("Invalid message: 'timestamp' must be a positive integer"))?;

    let sender = non_empty_string(raw, "sender")?;
    let receiver = non_empty_string(raw, "receiver")?;
    let correlation_id = non_empty_string(raw, "correlationId")?;

    let payload = validate_payload(raw, type_name)?;

    Ok(Message {
        timestamp,
        sender,
        receiver,
        correlation_id,
        version: version.to_string(),
        payload,
    })
}

fn validate_payload(raw: &Value, type_name: &str) -> Result<MessagePayload> {
    match type_name {
        "heartbeat" => Ok(MessagePayload::Heartbeat {
            status: require_string(raw, "status", "heartbeat")?,
            last_health_check: require_number(raw, "lastHealthCheck", "heartbeat")? as i64,
        }),
        "status_update" => Ok(MessagePayload::StatusUpdate {
            status: require_string(raw, "status", "status update")?,
        }),
        "error" => Ok(MessagePayload::Error {
            error: require_string(raw, "error", "error")?,
            code: require_string(raw, "code", "error")?,
        }),
        "task_assign" => Ok(MessagePayload::TaskAssign {
            task_id: require_string(raw, "taskId", "task assign")?,
            task_type: require_string(raw, "taskType", "task assign")?,
            parameters: require_any(raw, "parameters", "task assign")?,
            priority: require_number(raw, "priority", "task assign")? as i64,
            timeout: require_number(raw, "timeout", "task assign")? as i64,
        }),
        "task_complete" => Ok(MessagePayload::TaskComplete {
            task_id: require_string(raw, "taskId", "task complete")?,
            result: require_any(raw, "result", "task complete")?,
            duration: require_number(raw, "duration", "task complete")?,
        }),
        "task_fail" => Ok(MessagePayload::TaskFail {
            task_id: require_string(raw, "taskId", "task fail")?,
            error: require_string(raw, "error", "task fail")?,
            code: require_string(raw, "code", "task fail")?,
        }),
        "task_progress" => Ok(MessagePayload::TaskProgress {
            task_id: require_string(raw, "taskId", "task progress")?,
            progress: require_number(raw, "progress", "task progress")?,
            status: require_string(raw, "status", "task progress")?,
        }),
        "tool_request" => Ok(MessagePayload::ToolRequest {
            tool_id: require_string(raw, "toolId", "tool request")?,
            version: require_string(raw, "version", "tool request")?,
            parameters: require_any(raw, "parameters", "tool request")?,
            timeout: require_number(raw, "timeout", "tool request")? as i64,
        }),
        "tool_response" => Ok(MessagePayload::ToolResponse {
            tool_id: require_string(raw, "toolId", "tool response")?,
            result: require_any(raw, "result", "tool response")?,
            duration: require_number(raw, "duration", "tool response")?,
        }),
        "tool_error" => Ok(MessagePayload::ToolError {
            tool_id: require_string(raw, "toolId", "tool error")?,
            error: require_string(raw, "error", "tool error")?,
            code: require_string(raw, "code", "tool error")?,
        }),
        "a2a_message" => Ok(MessagePayload::A2aMessage {
            content: require_any(raw, "content", "a2a")?,
            metadata: require_any(raw, "metadata", "a2a")?,
        }),
        "a2a_state_sync" => Ok(MessagePayload::A2aStateSync {
            state: require_any(raw, "state", "a2a state sync")?,
            state_timestamp: require_number(raw, "stateTimestamp", "a2a state sync")? as i64,
        }),
        other => Err(invalid(format!("Invalid message: unknown type '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn heartbeat_json() -> Value {
        json!({
            "type": "heartbeat",
            "timestamp": 1_700_000_000_000i64,
            "sender": "a1",
            "receiver": "orch",
            "correlationId": "c1",
            "version": "1.0.0",
            "status": "ready",
            "lastHealthCheck": 1_700_000_000_000i64,
        })
    }

    #[test]
    fn accepts_well_formed_heartbeat() {
        let msg = validate(&heartbeat_json()).unwrap();
        assert_eq!(msg.type_name(), "heartbeat");
        assert_eq!(msg.sender, "a1");
    }

    #[test]
    fn rejects_version_mismatch() {
        let mut raw = heartbeat_json();
        raw["version"] = json!("0.9.0");
        let err = validate(&raw).unwrap_err();
        assert!(matches!(err, AgentflowError::VersionMismatch(_)));
        assert!(err.to_string().contains("Protocol version mismatch"));
        assert_eq!(err.code().as_str(), "VERSION_MISMATCH");
    }

    #[test]
    fn version_mismatch_outranks_unknown_type() {
        let mut raw = heartbeat_json();
        raw["type"] = json!("not_a_real_type");
        raw["version"] = json!("0.9.0");
        let err = validate(&raw).unwrap_err();
        assert!(matches!(err, AgentflowError::VersionMismatch(_)));
    }

    #[test]
    fn rejects_missing_variant_field() {
        let mut raw = heartbeat_json();
        raw.as_object_mut().unwrap().remove("lastHealthCheck");
        let err = validate(&raw).unwrap_err();
        assert!(matches!(err, AgentflowError::Validation(_)));
    }

    #[test]
    fn rejects_empty_sender() {
        let mut raw = heartbeat_json();
        raw["sender"] = json!("");
        assert!(validate(&raw).is_err());
    }

    #[test]
    fn rejects_non_positive_timestamp() {
        let mut raw = heartbeat_json();
        raw["timestamp"] = json!(-5);
        assert!(validate(&raw).is_err());
    }

    #[test]
    fn validates_tool_request_fields() {
        // tool_request's required "version" field and the envelope's protocol
        // "version" field share one wire key, so a valid envelope satisfies both.
        let raw = json!({
            "type": "tool_request",
            "timestamp": 1_700_000_000_000i64,
            "sender": "a1",
            "receiver": "orch",
            "correlationId": "c1",
            "version": "1.0.0",
            "toolId": "t1",
            "parameters": {"x": 1},
            "timeout": 1000,
        });
        let msg = validate(&raw).unwrap();
        assert_eq!(msg.type_name(), "tool_request");
    }
}
