//! Independent state recovery: re-derives an
//! `AgentState` from the database or the cache with retry on transport
//! failure, but never retries a structurally invalid record — that
//! distinction (and the retry/backoff bookkeeping itself) follows the
//! circuit breaker's failure-counting style, adapted from a trip/reset
//! state machine to a bounded retry loop.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::capability::{Cache, Store};
use crate::error::Result;
use crate::state::{validate_state, AgentState};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RecoveryConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: crate::constants::RECOVERY_MAX_RETRIES,
            retry_delay_ms: crate::constants::RECOVERY_RETRY_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RecoveryEvent {
    Start { source: &'static str, agent_id: String },
    Retry { source: &'static str, agent_id: String, attempt: u32 },
    Success { source: &'static str, agent_id: String },
    Failure { source: &'static str, agent_id: String, error: String },
}

fn cache_key(agent_id: &str) -> String {
    format!("agent:{agent_id}:state")
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn decode_and_validate(raw: &Value) -> Result<AgentState> {
    let state: AgentState = serde_json::from_value(raw.clone())?;
    validate_state(&state, now_ms())?;
    Ok(state)
}

pub struct Recovery {
    cache: Arc<dyn Cache>,
    store: Arc<dyn Store>,
    config: RecoveryConfig,
    events: mpsc::UnboundedSender<RecoveryEvent>,
}

impl Recovery {
    pub fn new(
        cache: Arc<dyn Cache>,
        store: Arc<dyn Store>,
        config: RecoveryConfig,
    ) -> (Self, mpsc::UnboundedReceiver<RecoveryEvent>) {
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

    fn emit(&self, event: RecoveryEvent) {
        let _ = self.events.send(event);
    }

    /// Generic retry driver shared by both recovery paths. `fetch` yields
    /// the raw stored value, if any; transport errors (an `Err` from
    /// `fetch`) are retried up to `max_retries` times, structural
    /// validation failures are not.
    async fn recover_via<F, Fut>(
        &self,
        source: &'static str,
        agent_id: &str,
        fetch: F,
    ) -> Result<Option<AgentState>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Option<Value>>>,
    {
        self.emit(RecoveryEvent::Start {
            source,
            agent_id: agent_id.to_string(),
        });

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match fetch().await {
                Ok(None) => {
                    self.emit(RecoveryEvent::Success {
                        source,
                        agent_id: agent_id.to_string(),
                    });
                    return Ok(None);
                }
                Ok(Some(raw)) => match decode_and_validate(&raw) {
                    Ok(state) => {
                        self.emit(RecoveryEvent::Success {
                            source,
                            agent_id: agent_id.to_string(),
                        });
                        return Ok(Some(state));
                    }
                    Err(err) => {
                        warn!(source, agent_id, error = %err, "structural validation failed, not retrying");
                        self.emit(RecoveryEvent::Failure {
                            source,
                            agent_id: agent_id.to_string(),
                            error: err.to_string(),
                        });
                        return Err(err);
                    }
                },
                Err(err) => {
                    if attempt >= self.config.max_retries {
                        self.emit(RecoveryEvent::Failure {
                            source,
                            agent_id: agent_id.to_string(),
                            error: err.to_string(),
                        });
                        return Err(err);
                    }
                    debug!(source, agent_id, attempt, error = %err, "transport failure, retrying");
                    self.emit(RecoveryEvent::Retry {
                        source,
                        agent_id: agent_id.to_string(),
                        attempt,
                    });
                    tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                }
            }
        }
    }

    pub async fn recover_from_database(&self, agent_id: &str) -> Result<Option<AgentState>> {
        self.recover_via("database", agent_id, || async {
            Ok(self
                .store
                .get_agent_state(agent_id)
                .await?
                .map(|row| row.state))
        })
        .await
    }

    pub async fn recover_from_cache(&self, agent_id: &str) -> Result<Option<AgentState>> {
        self.recover_via("cache", agent_id, || async {
            match self.cache.get(&cache_key(agent_id)).await? {
                Some(raw) => Ok(Some(serde_json::from_str::<Value>(&raw)?)),
                None => Ok(None),
            }
        })
        .await
    }

    /// Runs both recovery paths concurrently and resolves the result:
    /// both absent → `None`; one present → it wins; both present → the
    /// one with the greater `last_status_change` wins, ties going to the
    /// database.
    pub async fn recover_state(&self, agent_id: &str) -> Result<Option<AgentState>> {
        let (db, cache) = tokio::join!(
            self.recover_from_database(agent_id),
            self.recover_from_cache(agent_id)
        );
        let db = db?;
        let cache = cache?;

        Ok(match (db, cache) {
            (None, None) => None,
            (Some(s), None) | (None, Some(s)) => Some(s),
            (Some(db_state), Some(cache_state)) => {
                if cache_state.last_status_change > db_state.last_status_change {
                    Some(cache_state)
                } else {
                    Some(db_state)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{InMemoryCache, InMemoryStore};
    use serde_json::to_value;

    fn recovery() -> (Recovery, mpsc::UnboundedReceiver<RecoveryEvent>, Arc<InMemoryCache>, Arc<InMemoryStore>) {
        let cache = Arc::new(InMemoryCache::new());
        let store = Arc::new(InMemoryStore::new());
        let (recovery, rx) = Recovery::new(cache.clone(), store.clone(), RecoveryConfig::default());
        (recovery, rx, cache, store)
    }

    #[tokio::test]
    async fn recover_state_returns_none_when_both_empty() {
        let (recovery, _rx, _cache, _store) = recovery();
        assert!(recovery.recover_state("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recover_state_prefers_cache_on_later_status_change() {
        let (recovery, _rx, cache, store) = recovery();
        let mut db_state = AgentState::new(100);
        db_state.last_status_change = 100;
        let mut cache_state = AgentState::new(100);
        cache_state.last_status_change = 200;

        store
            .put_agent_state("a1", to_value(&db_state).unwrap())
            .await
            .unwrap();
        cache
            .set("agent:a1:state", &serde_json::to_string(&cache_state).unwrap(), 300)
            .await
            .unwrap();

        let resolved = recovery.recover_state("a1").await.unwrap().unwrap();
        assert_eq!(resolved.last_status_change, 200);
    }

    #[tokio::test]
    async fn recover_state_ties_go_to_database() {
        let (recovery, _rx, cache, store) = recovery();
        let mut db_state = AgentState::new(100);
        db_state.last_status_change = 150;
        let mut cache_state = AgentState::new(100);
        cache_state.last_status_change = 150;
        cache_state.load = 42.0;

        store
            .put_agent_state("a1", to_value(&db_state).unwrap())
            .await
            .unwrap();
        cache
            .set("agent:a1:state", &serde_json::to_string(&cache_state).unwrap(), 300)
            .await
            .unwrap();

        let resolved = recovery.recover_state("a1").await.unwrap().unwrap();
        assert_eq!(resolved.load, 0.0);
    }

    #[tokio::test]
    async fn structural_validation_failure_is_not_retried() {
        let (recovery, _rx, _cache, store) = recovery();
        let mut bad_state = AgentState::new(100);
        bad_state.load = 500.0;
        store
            .put_agent_state("a1", to_value(&bad_state).unwrap())
            .await
            .unwrap();

        let err = recovery.recover_from_database("a1").await.unwrap_err();
        assert!(err.to_string().contains("Invalid load value"));
    }
}
