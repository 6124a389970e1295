//! Orchestrator composition: the component that wires agents, tools, and
//! the lower-level engines (router, queue, persistence, transport) into one
//! addressable unit. Same map-of-participants plus status-tracking shape as
//! a single hardcoded agent-execution loop, generalized to an open agent
//! registry and envelope-level message dispatch.

pub mod agent_registry;
pub mod dispatch;
pub mod tool_registry;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{AgentflowError, Result};
use crate::persistence::PersistenceManager;
use crate::protocol::Message;
use crate::queue::MessageQueue;
use crate::router::Router;
use crate::transport::Transport;

pub use agent_registry::{Agent, AgentRegistry};
pub use dispatch::{Handler, MessageCategory, PassthroughHandler, TaskHandler};
pub use tool_registry::{Tool, ToolRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorStatus {
    Initializing,
    Running,
    Error,
    ShutDown,
}

/// Owns the agent and tool registries, the category→handler table, and the
/// lower-level engines this crate's other modules provide. Transport is
/// attached after construction since a binary may run headless (no
/// websocket listener) against the same orchestrator.
pub struct Orchestrator {
    status: RwLock<OrchestratorStatus>,
    agents: AgentRegistry,
    tools: ToolRegistry,
    handlers: RwLock<HashMap<MessageCategory, Arc<dyn Handler>>>,
    pub router: Arc<Router>,
    pub queue: Arc<MessageQueue>,
    pub persistence: Arc<PersistenceManager>,
    transport: RwLock<Option<Arc<Transport>>>,
}

impl Orchestrator {
    pub fn new(router: Arc<Router>, queue: Arc<MessageQueue>, persistence: Arc<PersistenceManager>) -> Self {
        Self {
            status: RwLock::new(OrchestratorStatus::ShutDown),
            agents: AgentRegistry::new(),
            tools: ToolRegistry::new(),
            handlers: RwLock::new(HashMap::new()),
            router,
            queue,
            persistence,
            transport: RwLock::new(None),
        }
    }

    pub async fn attach_transport(&self, transport: Arc<Transport>) {
        *self.transport.write().await = Some(transport);
    }

    pub async fn transport(&self) -> Option<Arc<Transport>> {
        self.transport.read().await.clone()
    }

    pub async fn status(&self) -> OrchestratorStatus {
        *self.status.read().await
    }

    /// INITIALIZING → install one handler per [`MessageCategory`] → RUNNING.
    /// Any failure along the way leaves status at ERROR.
    pub async fn initialize(&self) -> Result<()> {
        *self.status.write().await = OrchestratorStatus::Initializing;

        let result: Result<()> = async {
            let mut handlers = self.handlers.write().await;
            handlers.insert(MessageCategory::Task, Arc::new(TaskHandler) as Arc<dyn Handler>);
            for category in [
                MessageCategory::Result,
                MessageCategory::Status,
                MessageCategory::Error,
                MessageCategory::Control,
            ] {
                handlers.insert(category, Arc::new(PassthroughHandler) as Arc<dyn Handler>);
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                *self.status.write().await = OrchestratorStatus::Running;
                info!("orchestrator initialized");
                Ok(())
            }
            Err(err) => {
                *self.status.write().await = OrchestratorStatus::Error;
                warn!(error = %err, "orchestrator initialization failed");
                Err(err)
            }
        }
    }

    /// Duplicate id is an error. On success, `agent.initialize()` runs
    /// before the agent becomes reachable through the registry.
    pub async fn register_agent(&self, agent: Arc<dyn Agent>) -> Result<()> {
        if self.agents.get(agent.id()).await.is_some() {
            return Err(AgentflowError::Agent {
                message: format!("agent '{}' is already registered", agent.id()),
            });
        }
        agent.initialize().await?;
        self.agents.insert(agent).await
    }

    /// Shuts the agent down and removes it from the registry regardless of
    /// whether `shutdown()` succeeded.
    pub async fn unregister_agent(&self, id: &str) -> Result<()> {
        let agent = self.agents.get(id).await;
        let shutdown_result = match &agent {
            Some(agent) => agent.shutdown().await,
            None => return Err(AgentflowError::AgentNotFound(id.to_string())),
        };
        self.agents.remove(id).await;
        if let Err(err) = &shutdown_result {
            warn!(agent_id = id, error = %err, "agent shutdown failed, removed anyway");
        }
        shutdown_result
    }

    pub async fn register_tool(&self, tool: Arc<dyn Tool>) -> Result<()> {
        self.tools.insert(tool).await
    }

    pub async fn get_tool(&self, id: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(id).await
    }

    pub async fn agent_count(&self) -> usize {
        self.agents.len().await
    }

    /// Dispatches `message` by category to its installed handler, racing
    /// the handler against `ttl_ms` (defaulting to
    /// [`crate::constants::DEFAULT_MESSAGE_TTL_MS`]).
    pub async fn handle_message(&self, message: Message, ttl_ms: Option<u64>) -> Result<Message> {
        let category = MessageCategory::of(&message.payload);
        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(&category).cloned()
        }
        .ok_or_else(|| {
            AgentflowError::Routing(format!("no handler installed for {category:?} messages"))
        })?;

        let ttl = ttl_ms.unwrap_or(crate::constants::DEFAULT_MESSAGE_TTL_MS);
        match tokio::time::timeout(Duration::from_millis(ttl), handler.handle(&self.agents, message)).await
        {
            Ok(result) => result,
            Err(_) => Err(AgentflowError::Timeout {
                ms: ttl,
                message: format!("Message handling timed out after {ttl}ms"),
            }),
        }
    }

    /// Invokes every registered agent's `handle_message` in turn; the first
    /// failure aborts the broadcast and propagates.
    pub async fn broadcast_message(&self, message: &Message) -> Result<()> {
        for agent in self.agents.all().await {
            agent.handle_message(message).await?;
        }
        Ok(())
    }
}
