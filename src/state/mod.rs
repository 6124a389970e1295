//! Per-agent state with a single validated mutation path,
//! grounded on the status tracker's map-of-statuses shape but narrowed to
//! one agent per manager and hardened so every mutation is checked against
//! the data-model invariants before it commits — the status tracker lets
//! callers poke fields directly, which this manager deliberately does not.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};

use crate::error::{AgentflowError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatusValue {
    Ready,
    Busy,
    Error,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    pub cpu: f64,
    pub memory: f64,
    pub response_time: f64,
    pub error_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub last_check: i64,
    pub metrics: HealthMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkIo {
    pub bytes_in: f64,
    pub bytes_out: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Resources {
    pub cpu: f64,
    pub memory: f64,
    pub network: NetworkIo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub status: AgentStatusValue,
    pub health: Health,
    pub active_operations: u32,
    pub current_task: Option<String>,
    pub last_error: Option<String>,
    pub last_status_change: i64,
    pub last_health_check: i64,
    pub resources: Resources,
    pub capabilities: Vec<String>,
    pub load: f64,
    pub priority: Option<i64>,
    pub is_available: bool,
}

impl AgentState {
    /// A freshly initialized, available, idle agent.
    pub fn new(now_ms: i64) -> Self {
        Self {
            status: AgentStatusValue::Ready,
            health: Health {
                status: "healthy".to_string(),
                last_check: now_ms,
                metrics: HealthMetrics {
                    cpu: 0.0,
                    memory: 0.0,
                    response_time: 0.0,
                    error_rate: 0.0,
                },
            },
            active_operations: 0,
            current_task: None,
            last_error: None,
            last_status_change: now_ms,
            last_health_check: now_ms,
            resources: Resources {
                cpu: 0.0,
                memory: 0.0,
                network: NetworkIo { bytes_in: 0.0, bytes_out: 0.0 },
            },
            capabilities: Vec::new(),
            load: 0.0,
            priority: None,
            is_available: true,
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Checks `state` against the data-model invariants. `now_ms` is taken as a
/// parameter (rather than read internally) so the boundary case
/// "timestamp == now" is exercised deterministically in tests.
pub fn validate_state(state: &AgentState, now_ms: i64) -> Result<()> {
    let m = &state.health.metrics;
    if m.cpu < 0.0 || m.memory < 0.0 || m.response_time < 0.0 || m.error_rate < 0.0 {
        return Err(AgentflowError::Validation(
            "Resource metrics cannot be negative".to_string(),
        ));
    }
    let r = &state.resources;
    if r.cpu < 0.0 || r.memory < 0.0 || r.network.bytes_in < 0.0 || r.network.bytes_out < 0.0 {
        return Err(AgentflowError::Validation(
            "Resource metrics cannot be negative".to_string(),
        ));
    }
    if !(0.0..=100.0).contains(&state.load) {
        return Err(AgentflowError::Validation("Invalid load value".to_string()));
    }
    if state.current_task.is_some() && state.status != AgentStatusValue::Busy {
        return Err(AgentflowError::Validation(
            "currentTask requires status BUSY".to_string(),
        ));
    }
    if state.status == AgentStatusValue::Ready && state.current_task.is_some() {
        return Err(AgentflowError::Validation(
            "status READY requires no currentTask".to_string(),
        ));
    }
    if state.last_status_change > now_ms
        || state.last_health_check > now_ms
        || state.health.last_check > now_ms
    {
        return Err(AgentflowError::Validation(
            "timestamp cannot be in the future".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub enum StateEvent {
    StateChanged(Box<AgentState>, Box<AgentState>),
    HealthChanged(Box<AgentState>),
    ResourceUpdated(Box<AgentState>),
    TaskAssigned(String),
    TaskCompleted,
    ErrorOccurred(String),
}

/// Owns exactly one `AgentState`. Every mutation goes through
/// [`StateManager::update`] (or the two named transitions, which are thin
/// wrappers over it), so invariants cannot be bypassed by a setter.
pub struct StateManager {
    state: RwLock<AgentState>,
    events: mpsc::UnboundedSender<StateEvent>,
}

impl StateManager {
    pub fn new(initial: AgentState) -> (Self, mpsc::UnboundedReceiver<StateEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                state: RwLock::new(initial),
                events: tx,
            },
            rx,
        )
    }

    pub async fn snapshot(&self) -> AgentState {
        self.state.read().await.clone()
    }

    fn emit_transition(&self, old: &AgentState, new: &AgentState) {
        let _ = self.events.send(StateEvent::StateChanged(
            Box::new(old.clone()),
            Box::new(new.clone()),
        ));
        if old.health != new.health {
            let _ = self.events.send(StateEvent::HealthChanged(Box::new(new.clone())));
        }
        if old.resources != new.resources {
            let _ = self.events.send(StateEvent::ResourceUpdated(Box::new(new.clone())));
        }
        match (&old.current_task, &new.current_task) {
            (None, Some(id)) => {
                let _ = self.events.send(StateEvent::TaskAssigned(id.clone()));
            }
            (Some(_), None) => {
                let _ = self.events.send(StateEvent::TaskCompleted);
            }
            _ => {}
        }
        let old_error_empty = old.last_error.as_deref().unwrap_or("").is_empty();
        let new_error = new.last_error.as_deref().unwrap_or("");
        if old_error_empty && !new_error.is_empty() {
            let _ = self.events.send(StateEvent::ErrorOccurred(new_error.to_string()));
        }
    }

    /// The single validated update path. `mutate` is applied to a clone of
    /// the current state; if the result fails validation the current state
    /// is left untouched.
    pub async fn update(&self, mutate: impl FnOnce(&mut AgentState)) -> Result<AgentState> {
        let mut guard = self.state.write().await;
        let old = guard.clone();
        let mut candidate = guard.clone();
        mutate(&mut candidate);
        validate_state(&candidate, now_ms())?;
        *guard = candidate.clone();
        drop(guard);
        self.emit_transition(&old, &candidate);
        Ok(candidate)
    }

    pub async fn assign_task(&self, task_id: impl Into<String>) -> Result<AgentState> {
        let task_id = task_id.into();
        {
            let guard = self.state.read().await;
            if guard.current_task.is_some() || !guard.is_available {
                return Err(AgentflowError::Agent {
                    message: "cannot assign task: agent has a task or is unavailable".to_string(),
                });
            }
        }
        self.update(|s| {
            s.current_task = Some(task_id);
            s.status = AgentStatusValue::Busy;
            s.active_operations += 1;
            s.last_status_change = now_ms();
        })
        .await
    }

    pub async fn complete_task(&self) -> Result<AgentState> {
        {
            let guard = self.state.read().await;
            if guard.current_task.is_none() {
                return Err(AgentflowError::Agent {
                    message: "no current task to complete".to_string(),
                });
            }
        }
        self.update(|s| {
            s.current_task = None;
            s.status = AgentStatusValue::Ready;
            s.active_operations = s.active_operations.saturating_sub(1);
            s.last_status_change = now_ms();
        })
        .await
    }
}
