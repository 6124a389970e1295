//! System-wide defaults. Each value here is the hard default used when no
//! override is supplied via config file or environment.

pub const PROTOCOL_VERSION: &str = "1.0.0";

// Queue defaults
pub const QUEUE_MAX_RETRIES: u32 = 3;
pub const QUEUE_RETRY_DELAY_MS: u64 = 5000;
pub const QUEUE_DEAD_LETTER_NAME: &str = "dead-letter";
pub const QUEUE_MAX_SIZE: usize = 10_000;
pub const QUEUE_MESSAGE_TTL_SECS: u64 = 86_400;

// Pub/Sub defaults
pub const MAX_SUBSCRIPTIONS_PER_AGENT: usize = 100;
pub const MAX_TOPICS_PER_AGENT: usize = 50;
pub const WILDCARD_ENABLED: bool = true;
pub const DELIVERY_TIMEOUT_MS: u64 = 5000;

// Transport defaults
pub const HEARTBEAT_INTERVAL_MS: u64 = 30_000;

// Persistence defaults
pub const CACHE_STATE_TTL_SECS: u64 = 300;

// Recovery defaults
pub const RECOVERY_MAX_RETRIES: u32 = 3;
pub const RECOVERY_RETRY_DELAY_MS: u64 = 1000;

// Orchestrator defaults
pub const DEFAULT_MESSAGE_TTL_MS: u64 = 30_000;
