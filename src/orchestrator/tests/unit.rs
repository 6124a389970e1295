use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::{AgentflowError, Result};
use crate::orchestrator::{Agent, OrchestratorStatus, Tool};
use crate::protocol::Message;

use super::test_orchestrator;

struct RecordingAgent {
    id: String,
    initialized: Arc<AtomicBool>,
    shut_down: Arc<AtomicBool>,
}

#[async_trait]
impl Agent for RecordingAgent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn initialize(&self) -> Result<()> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn handle_message(&self, message: &Message) -> Result<Message> {
        Ok(message.clone())
    }
}

struct FailingShutdownAgent;

#[async_trait]
impl Agent for FailingShutdownAgent {
    fn id(&self) -> &str {
        "flaky"
    }

    async fn shutdown(&self) -> Result<()> {
        Err(AgentflowError::Agent { message: "shutdown blew up".to_string() })
    }

    async fn handle_message(&self, message: &Message) -> Result<Message> {
        Ok(message.clone())
    }
}

struct CountingTool {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl Tool for CountingTool {
    fn id(&self) -> &str {
        "counter"
    }

    async fn validate(&self, _params: &Value) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn execute(&self, params: Value) -> Result<Value> {
        Ok(params)
    }
}

#[tokio::test]
async fn initialize_transitions_to_running() {
    let orchestrator = test_orchestrator();
    assert_eq!(orchestrator.status().await, OrchestratorStatus::ShutDown);
    orchestrator.initialize().await.unwrap();
    assert_eq!(orchestrator.status().await, OrchestratorStatus::Running);
}

#[tokio::test]
async fn register_agent_initializes_it_and_rejects_duplicates() {
    let orchestrator = test_orchestrator();
    let initialized = Arc::new(AtomicBool::new(false));
    let agent = Arc::new(RecordingAgent {
        id: "a1".to_string(),
        initialized: initialized.clone(),
        shut_down: Arc::new(AtomicBool::new(false)),
    });

    orchestrator.register_agent(agent.clone()).await.unwrap();
    assert!(initialized.load(Ordering::SeqCst));
    assert_eq!(orchestrator.agent_count().await, 1);

    let err = orchestrator.register_agent(agent).await.unwrap_err();
    assert!(err.to_string().contains("already registered"));
}

#[tokio::test]
async fn unregister_agent_removes_it_even_if_shutdown_fails() {
    let orchestrator = test_orchestrator();
    orchestrator.register_agent(Arc::new(FailingShutdownAgent)).await.unwrap();
    assert_eq!(orchestrator.agent_count().await, 1);

    let err = orchestrator.unregister_agent("flaky").await.unwrap_err();
    assert!(err.to_string().contains("shutdown blew up"));
    assert_eq!(orchestrator.agent_count().await, 0);
}

#[tokio::test]
async fn unregister_unknown_agent_fails() {
    let orchestrator = test_orchestrator();
    assert!(orchestrator.unregister_agent("nobody").await.is_err());
}

#[tokio::test]
async fn register_tool_validates_before_storing() {
    let orchestrator = test_orchestrator();
    let calls = Arc::new(AtomicU32::new(0));
    orchestrator
        .register_tool(Arc::new(CountingTool { calls: calls.clone() }))
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(orchestrator.get_tool("counter").await.is_some());
}

#[tokio::test]
async fn handle_message_without_initialize_fails_with_no_handler() {
    let orchestrator = test_orchestrator();
    let message = crate::protocol::validate(&json!({
        "type": "heartbeat",
        "timestamp": 1,
        "sender": "a1",
        "receiver": "orch",
        "correlationId": "c1",
        "version": crate::constants::PROTOCOL_VERSION,
        "status": "ready",
        "lastHealthCheck": 1,
    }))
    .unwrap();

    let err = orchestrator.handle_message(message, None).await.unwrap_err();
    assert!(matches!(err, AgentflowError::Routing(_)));
}
