//! Message-category dispatch: the orchestrator installs one [`Handler`]
//! per [`MessageCategory`] at `initialize()` and looks the handler up by
//! category on every `handleMessage` call — the same table-lookup shape
//! the router uses for per-agent handlers, just keyed by category instead
//! of agent id.

use async_trait::async_trait;

use crate::error::{AgentflowError, Result};
use crate::protocol::{Message, MessagePayload};

use super::agent_registry::AgentRegistry;

/// The coarse message categories the orchestrator installs handlers for
/// (`TASK/RESULT/STATUS/ERROR/CONTROL`), one level up from the wire-level
/// variants in [`MessagePayload`]. Several wire variants map to the same
/// category; see [`MessageCategory::of`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageCategory {
    Task,
    Result,
    Status,
    Error,
    Control,
}

impl MessageCategory {
    pub const ALL: [MessageCategory; 5] = [
        MessageCategory::Task,
        MessageCategory::Result,
        MessageCategory::Status,
        MessageCategory::Error,
        MessageCategory::Control,
    ];

    pub fn of(payload: &MessagePayload) -> Self {
        match payload {
            MessagePayload::TaskAssign { .. } => MessageCategory::Task,
            MessagePayload::TaskComplete { .. } | MessagePayload::ToolResponse { .. } => {
                MessageCategory::Result
            }
            MessagePayload::StatusUpdate { .. }
            | MessagePayload::Heartbeat { .. }
            | MessagePayload::TaskProgress { .. } => MessageCategory::Status,
            MessagePayload::Error { .. }
            | MessagePayload::TaskFail { .. }
            | MessagePayload::ToolError { .. } => MessageCategory::Error,
            MessagePayload::ToolRequest { .. }
            | MessagePayload::A2aMessage { .. }
            | MessagePayload::A2aStateSync { .. } => MessageCategory::Control,
        }
    }
}

/// One handler per category, installed during `initialize()`.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, registry: &AgentRegistry, message: Message) -> Result<Message>;
}

/// `TASK` handler: forwards the message to the agent named by `receiver`
/// and returns its response.
pub struct TaskHandler;

#[async_trait]
impl Handler for TaskHandler {
    async fn handle(&self, registry: &AgentRegistry, message: Message) -> Result<Message> {
        let agent = registry
            .get(&message.receiver)
            .await
            .ok_or_else(|| AgentflowError::AgentNotFound(message.receiver.clone()))?;
        agent.handle_message(&message).await
    }
}

/// `RESULT`/`STATUS`/`ERROR`/`CONTROL` handler: sends the message through
/// unchanged, with no synthesized response.
pub struct PassthroughHandler;

#[async_trait]
impl Handler for PassthroughHandler {
    async fn handle(&self, _registry: &AgentRegistry, message: Message) -> Result<Message> {
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn heartbeat() -> Message {
        crate::protocol::validate(&json!({
            "type": "heartbeat",
            "timestamp": 1,
            "sender": "orch",
            "receiver": "a1",
            "correlationId": "c1",
            "version": crate::constants::PROTOCOL_VERSION,
            "status": "ready",
            "lastHealthCheck": 1,
        }))
        .unwrap()
    }

    #[test]
    fn heartbeat_is_status_category() {
        assert_eq!(MessageCategory::of(&heartbeat().payload), MessageCategory::Status);
    }

    #[tokio::test]
    async fn passthrough_returns_the_message_unchanged() {
        let registry = AgentRegistry::new();
        let reply = PassthroughHandler.handle(&registry, heartbeat()).await.unwrap();
        assert_eq!(reply.correlation_id, "c1");
    }

    #[tokio::test]
    async fn task_handler_fails_when_receiver_is_unknown() {
        let registry = AgentRegistry::new();
        let err = TaskHandler.handle(&registry, heartbeat()).await.unwrap_err();
        assert!(matches!(err, AgentflowError::AgentNotFound(_)));
    }
}
