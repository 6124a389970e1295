use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::Result;

/// Backing primitives for the message queue: a
/// score-ordered priority set, a string key/value store with per-key TTL,
/// and an append-only list for the dead-letter queue. Redis supplies all
/// three natively; this trait lets the queue module stay backend-agnostic.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    async fn kv_set(&self, key: &str, value: &str, ttl_sec: u64) -> Result<()>;
    async fn kv_get(&self, key: &str) -> Result<Option<String>>;
    async fn kv_del(&self, key: &str) -> Result<()>;

    /// Add or update `id`'s score in `set`.
    async fn zadd(&self, set: &str, id: &str, score: i64) -> Result<()>;
    /// Remove and return the highest-scoring member, if any.
    async fn zpop_max(&self, set: &str) -> Result<Option<(String, i64)>>;
    async fn zrem(&self, set: &str, id: &str) -> Result<()>;
    async fn zcard(&self, set: &str) -> Result<usize>;

    async fn list_push(&self, list: &str, value: &str) -> Result<()>;
    async fn list_len(&self, list: &str) -> Result<usize>;

    /// Deletes every `kv_prefix`-prefixed key, plus `set` and `list`
    /// entirely.
    async fn clear(&self, set: &str, list: &str, kv_prefix: &str) -> Result<()>;
}

struct KvEntry {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
struct Backing {
    kv: HashMap<String, KvEntry>,
    sets: HashMap<String, Vec<(String, i64)>>,
    lists: HashMap<String, Vec<String>>,
}

#[derive(Clone, Default)]
pub struct InMemoryQueueBackend {
    inner: Arc<RwLock<Backing>>,
}

impl InMemoryQueueBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueBackend for InMemoryQueueBackend {
    async fn kv_set(&self, key: &str, value: &str, ttl_sec: u64) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.kv.insert(
            key.to_string(),
            KvEntry {
                value: value.to_string(),
                expires_at: Instant::now() + Duration::from_secs(ttl_sec),
            },
        );
        Ok(())
    }

    async fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let mut inner = self.inner.write().await;
        match inner.kv.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                inner.kv.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn kv_del(&self, key: &str) -> Result<()> {
        self.inner.write().await.kv.remove(key);
        Ok(())
    }

    async fn zadd(&self, set: &str, id: &str, score: i64) -> Result<()> {
        let mut inner = self.inner.write().await;
        let members = inner.sets.entry(set.to_string()).or_default();
        if let Some(entry) = members.iter_mut().find(|(m, _)| m == id) {
            entry.1 = score;
        } else {
            members.push((id.to_string(), score));
        }
        Ok(())
    }

    async fn zpop_max(&self, set: &str) -> Result<Option<(String, i64)>> {
        let mut inner = self.inner.write().await;
        let Some(members) = inner.sets.get_mut(set) else {
            return Ok(None);
        };
        if members.is_empty() {
            return Ok(None);
        }
        let max_idx = members
            .iter()
            .enumerate()
            .max_by_key(|(_, (_, score))| *score)
            .map(|(i, _)| i)
            .expect("members non-empty");
        Ok(Some(members.remove(max_idx)))
    }

    async fn zrem(&self, set: &str, id: &str) -> Result<()> {
        if let Some(members) = self.inner.write().await.sets.get_mut(set) {
            members.retain(|(m, _)| m != id);
        }
        Ok(())
    }

    async fn zcard(&self, set: &str) -> Result<usize> {
        Ok(self
            .inner
            .read()
            .await
            .sets
            .get(set)
            .map(Vec::len)
            .unwrap_or(0))
    }

    async fn list_push(&self, list: &str, value: &str) -> Result<()> {
        self.inner
            .write()
            .await
            .lists
            .entry(list.to_string())
            .or_default()
            .push(value.to_string());
        Ok(())
    }

    async fn list_len(&self, list: &str) -> Result<usize> {
        Ok(self
            .inner
            .read()
            .await
            .lists
            .get(list)
            .map(Vec::len)
            .unwrap_or(0))
    }

    async fn clear(&self, set: &str, list: &str, kv_prefix: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.kv.retain(|k, _| !k.starts_with(kv_prefix));
        inner.sets.remove(set);
        inner.lists.remove(list);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn zpop_max_returns_highest_score() {
        let backend = InMemoryQueueBackend::new();
        backend.zadd("s", "low", 1).await.unwrap();
        backend.zadd("s", "high", 10).await.unwrap();
        backend.zadd("s", "mid", 5).await.unwrap();
        let (id, score) = backend.zpop_max("s").await.unwrap().unwrap();
        assert_eq!(id, "high");
        assert_eq!(score, 10);
        assert_eq!(backend.zcard("s").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn clear_removes_prefixed_keys_and_collections() {
        let backend = InMemoryQueueBackend::new();
        backend.kv_set("message:1", "a", 60).await.unwrap();
        backend.kv_set("other:1", "b", 60).await.unwrap();
        backend.zadd("queue", "1", 0).await.unwrap();
        backend.list_push("dead-letter", "x").await.unwrap();

        backend.clear("queue", "dead-letter", "message:").await.unwrap();

        assert_eq!(backend.kv_get("message:1").await.unwrap(), None);
        assert_eq!(backend.kv_get("other:1").await.unwrap(), Some("b".to_string()));
        assert_eq!(backend.zcard("queue").await.unwrap(), 0);
        assert_eq!(backend.list_len("dead-letter").await.unwrap(), 0);
    }
}
