//! Task lifecycle state machine: one driver shared by every
//! concrete task kind, parameterized over a [`TaskExecutor`] override
//! point instead of a class hierarchy — the agent trait's single
//! `async_trait` seam is the same shape, just applied to execution instead
//! of message handling.

pub mod kinds;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::error::Result;

pub use kinds::build_executor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDependency {
    pub task_id: String,
    pub task_type: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TaskResources {
    pub cpu: f64,
    pub memory: f64,
    pub timeout_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub id: String,
    pub task_type: String,
    pub priority: i64,
    #[serde(default)]
    pub dependencies: Vec<TaskDependency>,
    pub resources: TaskResources,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskError {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<TaskError>,
}

impl TaskOutcome {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(TaskError { message: message.into() }),
        }
    }
}

#[derive(Debug, Clone)]
struct TaskRecord {
    status: TaskStatus,
    start_time: Option<i64>,
    end_time: Option<i64>,
    duration_ms: Option<i64>,
    result: Option<TaskOutcome>,
}

impl Default for TaskRecord {
    fn default() -> Self {
        Self {
            status: TaskStatus::Pending,
            start_time: None,
            end_time: None,
            duration_ms: None,
            result: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TaskEvent {
    Start(String),
    Complete(String, TaskOutcome),
    Error(String, TaskOutcome),
}

/// The three override points a concrete task kind supplies. `cancel_task`
/// and `cleanup_task` default to no-ops: most kinds have nothing to
/// interrupt mid-flight or reclaim afterward.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute_task(&self, is_cancelled: &AtomicBool) -> Result<TaskOutcome>;

    async fn cancel_task(&self) -> Result<()> {
        Ok(())
    }

    async fn cleanup_task(&self) -> Result<()> {
        Ok(())
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Checks the static shape of a [`TaskConfig`]: non-empty id/type, each
/// dependency has a non-empty `task_id`/`task_type`, and every resource
/// value is non-negative. Returns the list of violated reasons.
fn validate_config(config: &TaskConfig) -> Vec<String> {
    let mut reasons = Vec::new();
    if config.id.is_empty() {
        reasons.push("id is required".to_string());
    }
    if config.task_type.is_empty() {
        reasons.push("type is required".to_string());
    }
    for (i, dep) in config.dependencies.iter().enumerate() {
        if dep.task_id.is_empty() {
            reasons.push(format!("dependency[{i}].taskId is required"));
        }
        if dep.task_type.is_empty() {
            reasons.push(format!("dependency[{i}].type is required"));
        }
    }
    let r = &config.resources;
    if r.cpu < 0.0 || r.memory < 0.0 || r.timeout_ms < 0.0 {
        reasons.push("resource values must be >= 0".to_string());
    }
    reasons
}

/// One task instance: immutable config, a swappable executor, and the
/// mutable lifecycle record. Terminal states ([`TaskStatus::Completed`] /
/// [`TaskStatus::Failed`]) are sticky — `cancel()` on a terminal task is a
/// no-op.
pub struct Task {
    pub config: TaskConfig,
    executor: Arc<dyn TaskExecutor>,
    is_cancelled: Arc<AtomicBool>,
    record: RwLock<TaskRecord>,
    events: mpsc::UnboundedSender<TaskEvent>,
}

impl Task {
    pub fn new(
        config: TaskConfig,
        executor: Arc<dyn TaskExecutor>,
    ) -> (Self, mpsc::UnboundedReceiver<TaskEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                config,
                executor,
                is_cancelled: Arc::new(AtomicBool::new(false)),
                record: RwLock::new(TaskRecord::default()),
                events: tx,
            },
            rx,
        )
    }

    pub async fn status(&self) -> TaskStatus {
        self.record.read().await.status
    }

    fn emit(&self, event: TaskEvent) {
        let _ = self.events.send(event);
    }

    async fn finish(&self, status: TaskStatus, outcome: TaskOutcome) -> TaskOutcome {
        let mut record = self.record.write().await;
        let end_time = now_ms();
        record.status = status;
        record.end_time = Some(end_time);
        record.duration_ms = record.start_time.map(|start| end_time - start);
        record.result = Some(outcome.clone());
        drop(record);

        if outcome.success {
            self.emit(TaskEvent::Complete(self.config.id.clone(), outcome.clone()));
        } else {
            self.emit(TaskEvent::Error(self.config.id.clone(), outcome.clone()));
        }
        outcome
    }

    /// Drives the full lifecycle: validate, check for a pre-execution
    /// cancel, run, check for a mid-execution cancel, then settle into
    /// `Completed` or `Failed`.
    pub async fn execute(&self) -> TaskOutcome {
        let violations = validate_config(&self.config);
        if !violations.is_empty() {
            warn!(task_id = %self.config.id, ?violations, "task config failed validation");
            return self
                .finish(
                    TaskStatus::Failed,
                    TaskOutcome::failure(format!("validation failed: {}", violations.join(", "))),
                )
                .await;
        }

        if self.is_cancelled.load(Ordering::Relaxed) {
            return self
                .finish(
                    TaskStatus::Failed,
                    TaskOutcome::failure("Task was cancelled before execution"),
                )
                .await;
        }

        {
            let mut record = self.record.write().await;
            record.status = TaskStatus::Running;
            record.start_time = Some(now_ms());
        }
        self.emit(TaskEvent::Start(self.config.id.clone()));
        info!(task_id = %self.config.id, "task started");

        let outcome = match self.executor.execute_task(&self.is_cancelled).await {
            Ok(outcome) => outcome,
            Err(err) => TaskOutcome::failure(err.to_string()),
        };

        if self.is_cancelled.load(Ordering::Relaxed) {
            return self
                .finish(
                    TaskStatus::Failed,
                    TaskOutcome::failure("Task was cancelled during execution"),
                )
                .await;
        }

        let status = if outcome.success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        self.finish(status, outcome).await
    }

    /// `Pending` settles immediately; `Running` sets the cancellation
    /// flag and invokes [`TaskExecutor::cancel_task`], whose result (error
    /// or not) becomes the failure reason. Terminal states are untouched.
    pub async fn cancel(&self) -> Result<()> {
        let current_status = self.record.read().await.status;
        match current_status {
            TaskStatus::Pending => {
                self.finish(
                    TaskStatus::Failed,
                    TaskOutcome::failure("Task was cancelled before execution"),
                )
                .await;
                Ok(())
            }
            TaskStatus::Running => {
                self.is_cancelled.store(true, Ordering::Relaxed);
                let cancel_outcome = match self.executor.cancel_task().await {
                    Ok(()) => TaskOutcome::failure("Task was cancelled during execution"),
                    Err(err) => TaskOutcome::failure(err.to_string()),
                };
                self.finish(TaskStatus::Failed, cancel_outcome).await;
                Ok(())
            }
            TaskStatus::Completed | TaskStatus::Failed => {
                debug!(task_id = %self.config.id, "cancel on terminal task is a no-op");
                Ok(())
            }
        }
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.executor.cleanup_task().await
    }
}
