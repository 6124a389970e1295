//! Cross-module orchestrator tests, split into focused files rather than
//! one large module.

mod unit;

use std::sync::Arc;

use crate::capability::{InMemoryCache, InMemoryQueueBackend, InMemoryStore};
use crate::persistence::PersistenceManager;
use crate::queue::{MessageQueue, QueueConfig};
use crate::router::Router;
use crate::router::RouterConfig;

use super::Orchestrator;

/// Builds an orchestrator wired entirely to in-memory backends, suitable
/// for both the unit and integration suites.
fn test_orchestrator() -> Orchestrator {
    let router = Arc::new(Router::new(RouterConfig::default()));
    let queue = Arc::new(MessageQueue::new(Arc::new(InMemoryQueueBackend::new()), QueueConfig::default()));
    let (persistence, _events) = PersistenceManager::new(
        Arc::new(InMemoryCache::new()),
        Arc::new(InMemoryStore::new()),
        crate::persistence::PersistenceConfig::default(),
    );
    Orchestrator::new(router, queue, Arc::new(persistence))
}
