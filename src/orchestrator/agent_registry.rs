//! Agent registry: `id -> Agent`, the simpler half of a dual-index shape —
//! here there is only one map, since per-agent health lives in
//! [`crate::state::StateManager`] rather than alongside the registry.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{AgentflowError, Result};
use crate::protocol::Message;

/// A participant the orchestrator can route `TASK` messages to.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &str;

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn handle_message(&self, message: &Message) -> Result<Message>;
}

#[derive(Default)]
pub struct AgentRegistry {
    agents: RwLock<HashMap<String, Arc<dyn Agent>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duplicate id is an error; the new agent is not initialized here,
    /// callers (`Orchestrator::register_agent`) drive that sequencing.
    pub async fn insert(&self, agent: Arc<dyn Agent>) -> Result<()> {
        let mut agents = self.agents.write().await;
        if agents.contains_key(agent.id()) {
            return Err(AgentflowError::Agent {
                message: format!("agent '{}' is already registered", agent.id()),
            });
        }
        agents.insert(agent.id().to_string(), agent);
        Ok(())
    }

    /// Removes the agent unconditionally, returning it if it was present.
    /// Callers that must call `shutdown()` first take it out via `get`.
    pub async fn remove(&self, id: &str) -> Option<Arc<dyn Agent>> {
        self.agents.write().await.remove(id)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<dyn Agent>> {
        self.agents.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn all(&self) -> Vec<Arc<dyn Agent>> {
        self.agents.read().await.values().cloned().collect()
    }
}
