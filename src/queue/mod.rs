//! Durable priority message queue, backed by a
//! [`QueueBackend`](crate::capability::QueueBackend) rather than an in-process
//! `Vec` — the retry/dead-letter bookkeeping needs to survive a process
//! restart in a real deployment, so the record of truth lives in the
//! backend and only the in-flight `processing` guard is memory-resident.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capability::QueueBackend;
use crate::error::{AgentflowError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueStatus {
    Pending,
    Processing,
    DeadLetter,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub id: String,
    pub payload: serde_json::Value,
    pub priority: i64,
    pub retries: u32,
    pub status: QueueStatus,
    pub last_attempt: Option<i64>,
    pub next_attempt: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueueStats {
    pub queue_size: usize,
    pub processing_count: usize,
    pub dead_letter_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub dead_letter_queue: String,
    pub max_queue_size: usize,
    pub message_ttl_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: crate::constants::QUEUE_MAX_RETRIES,
            retry_delay_ms: crate::constants::QUEUE_RETRY_DELAY_MS,
            dead_letter_queue: crate::constants::QUEUE_DEAD_LETTER_NAME.to_string(),
            max_queue_size: crate::constants::QUEUE_MAX_SIZE,
            message_ttl_secs: crate::constants::QUEUE_MESSAGE_TTL_SECS,
        }
    }
}

const PRIORITY_SET: &str = "queue:priority";

fn message_key(id: &str) -> String {
    format!("message:{id}")
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Priority-ordered message queue. Cheap to clone: all state lives behind
/// the shared backend and an `Arc<Mutex<HashSet>>` processing guard.
#[derive(Clone)]
pub struct MessageQueue {
    backend: Arc<dyn QueueBackend>,
    config: QueueConfig,
    processing: Arc<Mutex<HashSet<String>>>,
}

impl MessageQueue {
    pub fn new(backend: Arc<dyn QueueBackend>, config: QueueConfig) -> Self {
        Self {
            backend,
            config,
            processing: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Enqueues `payload` with the given `priority` (higher dequeues
    /// first). Fails with [`AgentflowError::QueueFull`] once the backing
    /// priority set has reached `max_queue_size`.
    pub async fn enqueue(&self, payload: serde_json::Value, priority: i64) -> Result<String> {
        let size = self.backend.zcard(PRIORITY_SET).await?;
        if size >= self.config.max_queue_size {
            return Err(AgentflowError::QueueFull {
                max: self.config.max_queue_size,
            });
        }

        let id = Uuid::new_v4().to_string();
        let message = QueuedMessage {
            id: id.clone(),
            payload,
            priority,
            retries: 0,
            status: QueueStatus::Pending,
            last_attempt: None,
            next_attempt: None,
        };

        let encoded = serde_json::to_string(&message)?;
        self.backend
            .kv_set(&message_key(&id), &encoded, self.config.message_ttl_secs)
            .await?;
        self.backend.zadd(PRIORITY_SET, &id, priority).await?;

        debug!(message_id = %id, priority, "message enqueued");
        Ok(id)
    }

    /// Pops the highest-priority message. Returns `None` on contention (the
    /// id is already being processed) or if the record already expired —
    /// both are normal, not errors.
    pub async fn dequeue(&self) -> Result<Option<QueuedMessage>> {
        let Some((id, score)) = self.backend.zpop_max(PRIORITY_SET).await? else {
            return Ok(None);
        };

        let mut processing = self.processing.lock().await;
        if processing.contains(&id) {
            drop(processing);
            self.backend.zadd(PRIORITY_SET, &id, score).await?;
            return Ok(None);
        }

        let Some(raw) = self.backend.kv_get(&message_key(&id)).await? else {
            processing.remove(&id);
            return Ok(None);
        };

        let mut message: QueuedMessage = serde_json::from_str(&raw)?;
        message.status = QueueStatus::Processing;
        message.last_attempt = Some(now_ms());

        self.backend
            .kv_set(
                &message_key(&id),
                &serde_json::to_string(&message)?,
                self.config.message_ttl_secs,
            )
            .await?;
        processing.insert(id.clone());

        debug!(message_id = %id, "message dequeued");
        Ok(Some(message))
    }

    /// Deletes the record and clears it from the priority set and the
    /// processing guard.
    pub async fn acknowledge(&self, id: &str) -> Result<()> {
        self.backend.kv_del(&message_key(id)).await?;
        self.backend.zrem(PRIORITY_SET, id).await?;
        self.processing.lock().await.remove(id);
        Ok(())
    }

    /// Records a failed delivery attempt. Moves the message to the
    /// dead-letter list once `retries` exceeds `max_retries`; otherwise
    /// reschedules it (pacing only — `next_attempt` is advisory, see
    /// [`MessageQueue::dequeue`]) with up to 20% jitter added to
    /// `retry_delay_ms` so a burst of simultaneously-failed messages
    /// doesn't retry in lockstep, and re-adds it to the priority set at its
    /// prior score.
    pub async fn handle_failure(&self, id: &str) -> Result<()> {
        self.processing.lock().await.remove(id);

        let Some(raw) = self.backend.kv_get(&message_key(id)).await? else {
            return Ok(());
        };
        let mut message: QueuedMessage = serde_json::from_str(&raw)?;
        message.retries += 1;

        if message.retries > self.config.max_retries {
            message.status = QueueStatus::DeadLetter;
            warn!(message_id = %id, retries = message.retries, "message moved to dead letter queue");
            self.backend
                .list_push(&self.config.dead_letter_queue, &serde_json::to_string(&message)?)
                .await?;
            self.backend.kv_del(&message_key(id)).await?;
            self.backend.zrem(PRIORITY_SET, id).await?;
        } else {
            message.status = QueueStatus::Pending;
            let jitter_ms = rand::thread_rng().gen_range(0..=self.config.retry_delay_ms / 5);
            message.next_attempt = Some(now_ms() + (self.config.retry_delay_ms + jitter_ms) as i64);
            self.backend
                .kv_set(
                    &message_key(id),
                    &serde_json::to_string(&message)?,
                    self.config.message_ttl_secs,
                )
                .await?;
            self.backend.zadd(PRIORITY_SET, id, message.priority).await?;
            info!(message_id = %id, retries = message.retries, "message rescheduled for retry");
        }

        Ok(())
    }

    pub async fn get_stats(&self) -> Result<QueueStats> {
        let store_count = self.backend.zcard(PRIORITY_SET).await?;
        let processing_count = self.processing.lock().await.len();
        let dead_letter_count = self.backend.list_len(&self.config.dead_letter_queue).await?;
        Ok(QueueStats {
            queue_size: store_count.saturating_sub(processing_count),
            processing_count,
            dead_letter_count,
        })
    }

    pub async fn clear(&self) -> Result<()> {
        self.backend
            .clear(PRIORITY_SET, &self.config.dead_letter_queue, "message:")
            .await?;
        self.processing.lock().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::InMemoryQueueBackend;
    use serde_json::json;

    fn queue(max_queue_size: usize) -> MessageQueue {
        MessageQueue::new(
            Arc::new(InMemoryQueueBackend::new()),
            QueueConfig {
                max_queue_size,
                ..QueueConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn enqueue_dequeue_roundtrip() {
        let q = queue(10);
        let id = q.enqueue(json!({"x": 1}), 0).await.unwrap();
        let msg = q.dequeue().await.unwrap().unwrap();
        assert_eq!(msg.id, id);
        assert_eq!(msg.status, QueueStatus::Processing);
    }

    #[tokio::test]
    async fn dequeue_respects_priority() {
        let q = queue(10);
        let low = q.enqueue(json!({}), 1).await.unwrap();
        let high = q.enqueue(json!({}), 10).await.unwrap();
        let first = q.dequeue().await.unwrap().unwrap();
        assert_eq!(first.id, high);
        q.acknowledge(&high).await.unwrap();
        let second = q.dequeue().await.unwrap().unwrap();
        assert_eq!(second.id, low);
    }

    #[tokio::test]
    async fn enqueue_fails_when_full() {
        let q = queue(1);
        q.enqueue(json!({}), 0).await.unwrap();
        let err = q.enqueue(json!({}), 0).await.unwrap_err();
        assert!(matches!(err, AgentflowError::QueueFull { max: 1 }));
        assert_eq!(err.code().as_str(), "QUEUE_FULL");
    }

    #[tokio::test]
    async fn retries_then_moves_to_dead_letter() {
        let q = MessageQueue::new(
            Arc::new(InMemoryQueueBackend::new()),
            QueueConfig {
                max_retries: 2,
                ..QueueConfig::default()
            },
        );
        let id = q.enqueue(json!({}), 5).await.unwrap();

        for _ in 0..2 {
            q.dequeue().await.unwrap();
            q.handle_failure(&id).await.unwrap();
        }
        // still retriable: requeued at its original priority.
        let requeued = q.dequeue().await.unwrap().unwrap();
        assert_eq!(requeued.priority, 5);
        assert_eq!(requeued.retries, 2);

        q.handle_failure(&id).await.unwrap();
        let stats = q.get_stats().await.unwrap();
        assert_eq!(stats.dead_letter_count, 1);
        assert_eq!(stats.queue_size, 0);
    }

    #[tokio::test]
    async fn dequeue_guards_against_contention() {
        let q = queue(10);
        q.enqueue(json!({}), 0).await.unwrap();
        let first = q.dequeue().await.unwrap();
        assert!(first.is_some());
        // Message is already in `processing`; a concurrent dequeue before
        // acknowledge must not hand it out twice.
        assert!(q.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clear_resets_everything() {
        let q = queue(10);
        q.enqueue(json!({}), 0).await.unwrap();
        q.clear().await.unwrap();
        let stats = q.get_stats().await.unwrap();
        assert_eq!(stats.queue_size, 0);
        assert_eq!(stats.processing_count, 0);
        assert_eq!(stats.dead_letter_count, 0);
    }
}
