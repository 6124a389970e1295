//! Capability traits: the abstract storage/queue backends that
//! `persistence`, `queue`, and `router` depend on rather than on a concrete
//! datastore. Production deployments plug in a Redis/Postgres-backed
//! implementation; this crate ships the in-memory reference implementations
//! used by tests and single-process deployments, in the same
//! dependency-inversion style as the session store's `SessionStore` /
//! `InMemorySessionStore` split.

mod cache;
mod queue_backend;
mod store;

pub use cache::{Cache, InMemoryCache};
pub use queue_backend::{InMemoryQueueBackend, QueueBackend};
pub use store::{AgentStateRow, InMemoryStore, Store};
