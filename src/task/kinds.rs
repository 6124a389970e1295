//! Concrete task kinds: computation, communication, and
//! storage. Each carries kind-specific metadata but shares the lifecycle
//! driver in [`super::Task`] entirely; only `execute_task` differs, and
//! even that is a thin placeholder here since the actual business logic
//! (what a computation task computes, what a communication task sends) is
//! an external collaborator, out of scope for this crate.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use super::{TaskExecutor, TaskOutcome};
use crate::error::{AgentflowError, Result};

pub struct ComputationTask {
    pub operation: String,
    pub input: Value,
}

#[async_trait]
impl TaskExecutor for ComputationTask {
    async fn execute_task(&self, _is_cancelled: &AtomicBool) -> Result<TaskOutcome> {
        Ok(TaskOutcome {
            success: true,
            data: Some(serde_json::json!({ "operation": self.operation, "input": self.input })),
            error: None,
        })
    }
}

pub struct CommunicationTask {
    pub target_agent: String,
    pub message: Value,
}

#[async_trait]
impl TaskExecutor for CommunicationTask {
    async fn execute_task(&self, _is_cancelled: &AtomicBool) -> Result<TaskOutcome> {
        Ok(TaskOutcome {
            success: true,
            data: Some(serde_json::json!({ "targetAgent": self.target_agent, "message": self.message })),
            error: None,
        })
    }
}

pub struct StorageTask {
    pub key: String,
    pub value: Value,
}

#[async_trait]
impl TaskExecutor for StorageTask {
    async fn execute_task(&self, _is_cancelled: &AtomicBool) -> Result<TaskOutcome> {
        Ok(TaskOutcome {
            success: true,
            data: Some(serde_json::json!({ "key": self.key, "value": self.value })),
            error: None,
        })
    }
}

/// Dispatches on `task_type` to build the matching executor, reading its
/// variant-specific fields out of `metadata`.
pub fn build_executor(task_type: &str, metadata: &Value) -> Result<Arc<dyn TaskExecutor>> {
    match task_type {
        "computation" => Ok(Arc::new(ComputationTask {
            operation: metadata
                .get("operation")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            input: metadata.get("input").cloned().unwrap_or(Value::Null),
        })),
        "communication" => Ok(Arc::new(CommunicationTask {
            target_agent: metadata
                .get("targetAgent")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            message: metadata.get("message").cloned().unwrap_or(Value::Null),
        })),
        "storage" => Ok(Arc::new(StorageTask {
            key: metadata
                .get("key")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            value: metadata.get("value").cloned().unwrap_or(Value::Null),
        })),
        other => Err(AgentflowError::Validation(format!("unknown task type '{other}'"))),
    }
}
