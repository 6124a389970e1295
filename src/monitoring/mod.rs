//! System health snapshots: queue depth, dead-letter count, agent count,
//! and live connections, on a periodic-collection-with-graceful-shutdown
//! loop. Platform CPU/memory/disk collection is out of scope — this module
//! reports only what this crate's own components can see.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::orchestrator::Orchestrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub timestamp_ms: i64,
    pub uptime_seconds: f64,
    pub health_status: HealthStatus,
    pub agent_count: usize,
    pub queue_size: usize,
    pub queue_processing_count: usize,
    pub dead_letter_count: usize,
    pub connection_count: usize,
}

impl SystemSnapshot {
    fn classify(queue_size: usize, dead_letter_count: usize, max_queue_size: usize) -> HealthStatus {
        let fill_ratio = queue_size as f64 / max_queue_size.max(1) as f64;
        if dead_letter_count > 0 && fill_ratio >= 0.9 {
            HealthStatus::Unhealthy
        } else if fill_ratio >= 0.75 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MonitoringConfig {
    pub collection_interval: Duration,
    pub retention_count: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            collection_interval: Duration::from_secs(30),
            retention_count: 200,
        }
    }
}

/// Periodically samples the orchestrator and its engines into a bounded
/// ring of [`SystemSnapshot`]s.
pub struct SystemMonitor {
    config: MonitoringConfig,
    start_time: Instant,
    orchestrator: Arc<Orchestrator>,
    history: Arc<RwLock<Vec<SystemSnapshot>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl SystemMonitor {
    pub fn new(orchestrator: Arc<Orchestrator>, config: MonitoringConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
            orchestrator,
            history: Arc::new(RwLock::new(Vec::new())),
            handle: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
        }
    }

    async fn collect(&self) -> SystemSnapshot {
        let stats = match self.orchestrator.queue.get_stats().await {
            Ok(stats) => stats,
            Err(err) => {
                warn!(error = %err, "failed to read queue stats, reporting zeroed counts");
                crate::queue::QueueStats {
                    queue_size: 0,
                    processing_count: 0,
                    dead_letter_count: 0,
                }
            }
        };
        let connection_count = match self.orchestrator.transport().await {
            Some(transport) => transport.connection_count().await,
            None => 0,
        };

        let snapshot = SystemSnapshot {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            uptime_seconds: self.start_time.elapsed().as_secs_f64(),
            health_status: SystemSnapshot::classify(
                stats.queue_size,
                stats.dead_letter_count,
                crate::constants::QUEUE_MAX_SIZE,
            ),
            agent_count: self.orchestrator.agent_count().await,
            queue_size: stats.queue_size,
            queue_processing_count: stats.processing_count,
            dead_letter_count: stats.dead_letter_count,
            connection_count,
        };
        debug!(?snapshot, "collected system snapshot");
        snapshot
    }

    /// Starts the background collection loop. Call on an `Arc<SystemMonitor>`
    /// so the spawned task can hold its own handle.
    pub async fn start(self: &Arc<Self>) {
        let (tx, mut rx) = mpsc::channel::<()>(1);
        *self.shutdown_tx.lock().await = Some(tx);

        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(monitor.config.collection_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let snapshot = monitor.collect().await;
                        let mut history = monitor.history.write().await;
                        history.push(snapshot);
                        if history.len() > monitor.config.retention_count {
                            history.remove(0);
                        }
                    }
                    _ = rx.recv() => {
                        info!("system monitor shutting down");
                        break;
                    }
                }
            }
        });
        *self.handle.lock().await = Some(handle);
        info!("system monitor started");
    }

    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.lock().await.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "monitor task join failed");
            }
        }
    }

    pub async fn latest(&self) -> Option<SystemSnapshot> {
        self.history.read().await.last().cloned()
    }

    pub async fn history(&self) -> Vec<SystemSnapshot> {
        self.history.read().await.clone()
    }
}
