use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;

/// One row of the `agent_states` table.
#[derive(Debug, Clone)]
pub struct AgentStateRow {
    pub agent_id: String,
    pub state: Value,
    pub updated_at: DateTime<Utc>,
}

/// Durable, row-oriented store with JSON column support. Scoped here to
/// the `agent_states` table; `message_history` is part of the wire schema
/// but has no operation elsewhere in this crate that this
/// needs to drive, so it is not modeled as a trait method.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_agent_state(&self, agent_id: &str) -> Result<Option<AgentStateRow>>;
    async fn put_agent_state(&self, agent_id: &str, state: Value) -> Result<()>;
    async fn delete_agent_state(&self, agent_id: &str) -> Result<()>;
    /// Deletes rows with `updated_at` older than `max_age_sec`. Returns the
    /// number of rows removed.
    async fn delete_agent_states_older_than(&self, max_age_sec: u64) -> Result<usize>;
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    rows: Arc<RwLock<HashMap<String, AgentStateRow>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_agent_state(&self, agent_id: &str) -> Result<Option<AgentStateRow>> {
        Ok(self.rows.read().await.get(agent_id).cloned())
    }

    async fn put_agent_state(&self, agent_id: &str, state: Value) -> Result<()> {
        self.rows.write().await.insert(
            agent_id.to_string(),
            AgentStateRow {
                agent_id: agent_id.to_string(),
                state,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn delete_agent_state(&self, agent_id: &str) -> Result<()> {
        self.rows.write().await.remove(agent_id);
        Ok(())
    }

    async fn delete_agent_states_older_than(&self, max_age_sec: u64) -> Result<usize> {
        let cutoff = Utc::now() - chrono::Duration::seconds(max_age_sec as i64);
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|_, row| row.updated_at >= cutoff);
        Ok(before - rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn round_trips_agent_state() {
        let store = InMemoryStore::new();
        store.put_agent_state("a1", json!({"status": "ready"})).await.unwrap();
        let row = store.get_agent_state("a1").await.unwrap().unwrap();
        assert_eq!(row.state["status"], "ready");
        store.delete_agent_state("a1").await.unwrap();
        assert!(store.get_agent_state("a1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleans_up_old_rows() {
        let store = InMemoryStore::new();
        store.put_agent_state("a1", json!({})).await.unwrap();
        let removed = store.delete_agent_states_older_than(0).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_agent_state("a1").await.unwrap().is_none());
    }
}
