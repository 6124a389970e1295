//! Pub/sub router with wildcard topic matching. Subscriptions
//! are dual-indexed — by topic, for publish, and by agent, for limit
//! enforcement and teardown — sharing the same `Arc<SubscriptionRecord>` so
//! delivery counters stay in sync across both indices, in the same
//! dual-index style as `orchestrator::agent_registry::AgentRegistry` keeping
//! agents and statuses in separate maps keyed the same way.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{AgentflowError, Result};

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, topic: &str, message: Value) -> Result<()>;
}

#[derive(Debug)]
pub struct SubscriptionRecord {
    pub agent_id: String,
    pub topic: String,
    last_delivery: AtomicI64,
    delivery_count: AtomicU64,
    failed_deliveries: AtomicU64,
}

impl SubscriptionRecord {
    fn new(agent_id: String, topic: String) -> Self {
        Self {
            agent_id,
            topic,
            last_delivery: AtomicI64::new(0),
            delivery_count: AtomicU64::new(0),
            failed_deliveries: AtomicU64::new(0),
        }
    }

    pub fn last_delivery(&self) -> i64 {
        self.last_delivery.load(Ordering::Relaxed)
    }

    pub fn delivery_count(&self) -> u64 {
        self.delivery_count.load(Ordering::Relaxed)
    }

    pub fn failed_deliveries(&self) -> u64 {
        self.failed_deliveries.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RouterConfig {
    pub max_subscriptions_per_agent: usize,
    pub max_topics_per_agent: usize,
    pub wildcard_enabled: bool,
    pub delivery_timeout_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_subscriptions_per_agent: crate::constants::MAX_SUBSCRIPTIONS_PER_AGENT,
            max_topics_per_agent: crate::constants::MAX_TOPICS_PER_AGENT,
            wildcard_enabled: crate::constants::WILDCARD_ENABLED,
            delivery_timeout_ms: crate::constants::DELIVERY_TIMEOUT_MS,
        }
    }
}

fn wildcard_pattern_to_regex(pattern: &str) -> Regex {
    let mut anchored = String::from("^");
    for part in pattern.split('*') {
        anchored.push_str(&regex::escape(part));
        anchored.push_str(".*");
    }
    // split('*') yields one more fragment than there are `*`s, so the loop
    // above appends a trailing ".*" that must be trimmed off.
    anchored.truncate(anchored.len() - 2);
    anchored.push('$');
    Regex::new(&anchored).expect("constructed from escaped literal segments")
}

#[derive(Default)]
pub struct Router {
    config: RouterConfig,
    by_topic: RwLock<HashMap<String, Vec<Arc<SubscriptionRecord>>>>,
    by_agent: RwLock<HashMap<String, Vec<Arc<SubscriptionRecord>>>>,
    handlers: RwLock<HashMap<String, Arc<dyn MessageHandler>>>,
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            by_topic: RwLock::new(HashMap::new()),
            by_agent: RwLock::new(HashMap::new()),
            handlers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register_handler(&self, agent_id: &str, handler: Arc<dyn MessageHandler>) {
        self.handlers.write().await.insert(agent_id.to_string(), handler);
    }

    pub async fn subscribe(&self, agent_id: &str, topic: &str) -> Result<()> {
        let mut by_agent = self.by_agent.write().await;
        let agent_subs = by_agent.entry(agent_id.to_string()).or_default();

        if agent_subs.len() >= self.config.max_subscriptions_per_agent {
            return Err(AgentflowError::Validation(
                "Subscription limit exceeded".to_string(),
            ));
        }

        let distinct_topics: usize = {
            let mut topics: Vec<&str> = agent_subs.iter().map(|s| s.topic.as_str()).collect();
            topics.push(topic);
            topics.sort_unstable();
            topics.dedup();
            topics.len()
        };
        if distinct_topics > self.config.max_topics_per_agent {
            return Err(AgentflowError::Validation(
                "Subscription limit exceeded".to_string(),
            ));
        }

        let record = Arc::new(SubscriptionRecord::new(agent_id.to_string(), topic.to_string()));
        agent_subs.push(record.clone());

        let mut by_topic = self.by_topic.write().await;
        by_topic.entry(topic.to_string()).or_default().push(record);

        Ok(())
    }

    pub async fn unsubscribe(&self, agent_id: &str, topic: &str) {
        let mut by_agent = self.by_agent.write().await;
        if let Some(subs) = by_agent.get_mut(agent_id) {
            subs.retain(|s| s.topic != topic);
            if subs.is_empty() {
                by_agent.remove(agent_id);
            }
        }

        let mut by_topic = self.by_topic.write().await;
        if let Some(subs) = by_topic.get_mut(topic) {
            subs.retain(|s| s.agent_id != agent_id);
            if subs.is_empty() {
                by_topic.remove(topic);
            }
        }
    }

    async fn subscribers_for(&self, topic: &str) -> Vec<Arc<SubscriptionRecord>> {
        let by_topic = self.by_topic.read().await;
        let mut matched: Vec<Arc<SubscriptionRecord>> =
            by_topic.get(topic).cloned().unwrap_or_default();

        if self.config.wildcard_enabled {
            for (pattern, subs) in by_topic.iter() {
                if pattern == topic || !pattern.contains('*') {
                    continue;
                }
                if wildcard_pattern_to_regex(pattern).is_match(topic) {
                    matched.extend(subs.iter().cloned());
                }
            }
        }

        matched
    }

    /// Delivers `message` to every subscriber of `topic` (exact match plus
    /// wildcard matches, if enabled). Handler invocations run concurrently,
    /// each raced against `delivery_timeout_ms`; the first failure (a
    /// handler error or a timeout) is returned once all have completed,
    /// after per-subscription counters are updated.
    pub async fn publish(&self, topic: &str, message: Value) -> Result<()> {
        let subscribers = self.subscribers_for(topic).await;
        if subscribers.is_empty() {
            debug!(topic, "publish with no subscribers");
            return Ok(());
        }

        let delivery_timeout = Duration::from_millis(self.config.delivery_timeout_ms);
        let handlers = self.handlers.read().await;
        let deliveries = subscribers.into_iter().map(|sub| {
            let handler = handlers.get(&sub.agent_id).cloned();
            let message = message.clone();
            let topic = topic.to_string();
            async move {
                let attempt = async {
                    match handler {
                        Some(handler) => handler.handle(&topic, message).await,
                        None => Err(AgentflowError::Routing(format!(
                            "No message handler found for agent {}",
                            sub.agent_id
                        ))),
                    }
                };
                let result = match tokio::time::timeout(delivery_timeout, attempt).await {
                    Ok(result) => result,
                    Err(_) => Err(AgentflowError::Timeout {
                        ms: delivery_timeout.as_millis() as u64,
                        message: format!("delivery to agent {} timed out", sub.agent_id),
                    }),
                };
                match &result {
                    Ok(()) => {
                        sub.last_delivery
                            .store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);
                        sub.delivery_count.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        sub.failed_deliveries.fetch_add(1, Ordering::Relaxed);
                        warn!(agent_id = %sub.agent_id, %topic, error = %err, "delivery failed");
                    }
                }
                result
            }
        });

        let results = futures::future::join_all(deliveries).await;
        results.into_iter().collect::<Result<Vec<()>>>()?;
        Ok(())
    }
}
