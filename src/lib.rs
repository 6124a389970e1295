//! # agentflow-core
//!
//! A multi-agent orchestration runtime: a validated message protocol, a
//! pub/sub router with wildcard topics, a retrying priority queue, a
//! websocket transport, per-agent state tracking with two-tier persistence,
//! and a cooperatively-cancellable task engine, composed by one
//! orchestrator.
//!
//! ## Architecture
//!
//! The system consists of:
//! - **Protocol**: envelope schema and validator all messages pass through
//! - **Rate limiter**: token-bucket admission control
//! - **Queue**: priority-ordered retry queue with a dead-letter sink
//! - **Router**: pub/sub dispatch with wildcard topic matching
//! - **Transport**: websocket connection registry with heartbeat liveness
//! - **State**: per-agent state with a single validated mutation path
//! - **Persistence**: two-tier (cache + store) state durability and recovery
//! - **Task**: a lifecycle driver shared by every task kind
//! - **Orchestrator**: wires agents, tools, and the engines above together
//!
//! ## Usage
//!
//! Typically run as a standalone service exposing a websocket endpoint for
//! agents and an HTTP surface for operational queries; see `main.rs`.

/// HTTP and websocket-upgrade surface.
pub mod api;
/// Capability boundary: cache, durable store, and queue backing traits,
/// plus in-memory reference implementations.
pub mod capability;
/// Layered configuration.
pub mod config;
/// System-wide constants and defaults.
pub mod constants;
/// Error types and error-code mapping.
pub mod error;
/// System health snapshots.
pub mod monitoring;
/// Orchestrator composition: agents, tools, and message dispatch.
pub mod orchestrator;
/// Message protocol: envelope schema and validator.
pub mod protocol;
/// Priority retry queue with a dead-letter sink.
pub mod queue;
/// Token-bucket rate limiter.
pub mod rate_limit;
/// Pub/sub router with wildcard topic matching.
pub mod router;
/// Per-agent state manager.
pub mod state;
/// Task lifecycle state machine and concrete task kinds.
pub mod task;
/// Websocket transport and connection registry.
pub mod transport;

pub use error::{AgentflowError, Result};
