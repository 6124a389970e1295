//! Tool registry: `id -> Tool`. Tools are validated once at registration
//! time, not on every invocation — the same "register once, look up many"
//! shape as [`super::agent_registry::AgentRegistry`].

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{AgentflowError, Result};

/// A callable capability the orchestrator exposes to agents via
/// `TOOL_REQUEST` messages.
#[async_trait]
pub trait Tool: Send + Sync {
    fn id(&self) -> &str;

    /// Returns `Ok(true)` when `params` is an acceptable configuration for
    /// this tool. `Ok(false)` and `Err` are both registration failures; the
    /// caller wraps either into `Tool validation error: ...`.
    async fn validate(&self, params: &Value) -> Result<bool>;

    async fn execute(&self, params: Value) -> Result<Value>;
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duplicate id is an error. `tool.validate(&Value::Null)` must pass
    /// before the tool is stored; a falsy result or an `Err` both become
    /// `Tool validation error: ...`.
    pub async fn insert(&self, tool: Arc<dyn Tool>) -> Result<()> {
        let mut tools = self.tools.write().await;
        if tools.contains_key(tool.id()) {
            return Err(AgentflowError::Tool {
                message: format!("tool '{}' is already registered", tool.id()),
            });
        }

        let valid = tool.validate(&Value::Null).await.map_err(|err| AgentflowError::Tool {
            message: format!("Tool validation error: {err}"),
        })?;
        if !valid {
            return Err(AgentflowError::Tool {
                message: "Tool validation error: validate() returned false".to_string(),
            });
        }

        tools.insert(tool.id().to_string(), tool);
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.tools.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysValid;

    #[async_trait]
    impl Tool for AlwaysValid {
        fn id(&self) -> &str {
            "echo"
        }

        async fn validate(&self, _params: &Value) -> Result<bool> {
            Ok(true)
        }

        async fn execute(&self, params: Value) -> Result<Value> {
            Ok(params)
        }
    }

    struct NeverValid;

    #[async_trait]
    impl Tool for NeverValid {
        fn id(&self) -> &str {
            "broken"
        }

        async fn validate(&self, _params: &Value) -> Result<bool> {
            Ok(false)
        }

        async fn execute(&self, _params: Value) -> Result<Value> {
            unreachable!("never registered")
        }
    }

    #[tokio::test]
    async fn registers_a_valid_tool() {
        let registry = ToolRegistry::new();
        registry.insert(Arc::new(AlwaysValid)).await.unwrap();
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn rejects_a_tool_that_fails_validation() {
        let registry = ToolRegistry::new();
        let err = registry.insert(Arc::new(NeverValid)).await.unwrap_err();
        assert!(err.to_string().contains("Tool validation error"));
    }

    #[tokio::test]
    async fn rejects_duplicate_registration() {
        let registry = ToolRegistry::new();
        registry.insert(Arc::new(AlwaysValid)).await.unwrap();
        let err = registry.insert(Arc::new(AlwaysValid)).await.unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }
}
