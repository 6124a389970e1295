//! Two-tier agent state persistence: a cache in front of a
//! durable store, write-through on save. Mirrors the cache/store split of
//! the capability layer directly — this module holds no state of its own,
//! it only mediates the two, the same shape as `session::SessionManager`
//! sitting in front of a `SessionStore`.

pub mod recovery;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::capability::{Cache, Store};
use crate::error::Result;
use crate::state::AgentState;

pub use recovery::{Recovery, RecoveryConfig, RecoveryEvent};

#[derive(Debug, Clone)]
pub enum PersistenceEvent {
    Error(String),
    StatesSynced,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub cache_ttl_secs: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: crate::constants::CACHE_STATE_TTL_SECS,
        }
    }
}

fn cache_key(agent_id: &str) -> String {
    format!("agent:{agent_id}:state")
}

pub struct PersistenceManager {
    cache: Arc<dyn Cache>,
    store: Arc<dyn Store>,
    config: PersistenceConfig,
    events: mpsc::UnboundedSender<PersistenceEvent>,
}

impl PersistenceManager {
    pub fn new(
        cache: Arc<dyn Cache>,
        store: Arc<dyn Store>,
        config: PersistenceConfig,
    ) -> (Self, mpsc::UnboundedReceiver<PersistenceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                cache,
                store,
                config,
                events: tx,
            },
            rx,
        )
    }

    fn emit(&self, event: PersistenceEvent) {
        let _ = self.events.send(event);
    }

    /// Writes cache then store; both must succeed. On either failure an
    /// `error` event is emitted before the failure propagates. The cache
    /// write is not rolled back if the store write subsequently fails.
    pub async fn save_state(&self, agent_id: &str, state: &AgentState) -> Result<()> {
        let encoded = serde_json::to_string(state)?;
        if let Err(err) = self
            .cache
            .set(&cache_key(agent_id), &encoded, self.config.cache_ttl_secs)
            .await
        {
            self.emit(PersistenceEvent::Error(err.to_string()));
            return Err(err);
        }

        let value: Value = serde_json::to_value(state)?;
        if let Err(err) = self.store.put_agent_state(agent_id, value).await {
            self.emit(PersistenceEvent::Error(err.to_string()));
            return Err(err);
        }

        Ok(())
    }

    /// Cache hit returns directly. On a cache miss, falls back to the
    /// store and, if found there, repopulates the cache before returning.
    pub async fn load_state(&self, agent_id: &str) -> Result<Option<AgentState>> {
        if let Some(raw) = self.cache.get(&cache_key(agent_id)).await? {
            return Ok(Some(serde_json::from_str(&raw)?));
        }

        let Some(row) = self.store.get_agent_state(agent_id).await? else {
            return Ok(None);
        };
        let state: AgentState = serde_json::from_value(row.state)?;
        let encoded = serde_json::to_string(&state)?;
        self.cache
            .set(&cache_key(agent_id), &encoded, self.config.cache_ttl_secs)
            .await?;
        Ok(Some(state))
    }

    pub async fn delete_state(&self, agent_id: &str) -> Result<()> {
        self.cache.del(&cache_key(agent_id)).await?;
        self.store.delete_agent_state(agent_id).await?;
        Ok(())
    }

    /// Periodic reconciliation hook. Callers drive the schedule (e.g. a
    /// timer task in the binary); this just performs one pass and reports
    /// it.
    pub async fn sync_states(&self) -> Result<()> {
        self.cache.ping().await?;
        info!("state reconciliation pass completed");
        self.emit(PersistenceEvent::StatesSynced);
        Ok(())
    }

    pub async fn cleanup_old_states(&self, max_age_sec: u64) -> Result<usize> {
        let removed = self.store.delete_agent_states_older_than(max_age_sec).await?;
        if removed > 0 {
            info!(removed, "cleaned up stale agent states");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{InMemoryCache, InMemoryStore};

    fn manager() -> (PersistenceManager, mpsc::UnboundedReceiver<PersistenceEvent>) {
        PersistenceManager::new(
            Arc::new(InMemoryCache::new()),
            Arc::new(InMemoryStore::new()),
            PersistenceConfig::default(),
        )
    }

    #[tokio::test]
    async fn save_then_load_round_trips_through_cache() {
        let (manager, _events) = manager();
        let state = AgentState::new(1);
        manager.save_state("a1", &state).await.unwrap();
        let loaded = manager.load_state("a1").await.unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn load_falls_back_to_store_and_repopulates_cache() {
        let cache = Arc::new(InMemoryCache::new());
        let store = Arc::new(InMemoryStore::new());
        let (manager, _events) = PersistenceManager::new(
            cache.clone(),
            store.clone(),
            PersistenceConfig::default(),
        );
        let state = AgentState::new(1);
        store
            .put_agent_state("a1", serde_json::to_value(&state).unwrap())
            .await
            .unwrap();

        let loaded = manager.load_state("a1").await.unwrap().unwrap();
        assert_eq!(loaded, state);
        assert!(cache.get("agent:a1:state").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn load_returns_none_when_absent_everywhere() {
        let (manager, _events) = manager();
        assert!(manager.load_state("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_clears_both_tiers() {
        let (manager, _events) = manager();
        let state = AgentState::new(1);
        manager.save_state("a1", &state).await.unwrap();
        manager.delete_state("a1").await.unwrap();
        assert!(manager.load_state("a1").await.unwrap().is_none());
    }
}
