//! Layered configuration: an optional `.env` file loaded via `dotenvy`,
//! then the `config` crate's builder layering hard defaults, an optional
//! file, and `AGENTFLOW_*`-prefixed environment overrides.

use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{AgentflowError, Result};
use crate::persistence::{PersistenceConfig, RecoveryConfig};
use crate::queue::QueueConfig;
use crate::rate_limit::RateLimiterConfig;
use crate::router::RouterConfig;
use crate::transport::TransportConfig;

/// Queue settings plus the backing-store connection string, which is
/// capability wiring rather than queue policy and so lives outside
/// [`QueueConfig`] itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(flatten)]
    pub policy: QueueConfig,
}

/// Transport settings plus the listener address, which the wire-level
/// [`TransportConfig`] (heartbeat cadence only) doesn't carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    pub port: u16,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub max_connections: Option<usize>,
    #[serde(flatten)]
    pub policy: TransportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub queue: QueueSettings,
    pub router: RouterConfig,
    pub transport: TransportSettings,
    pub persistence: PersistenceConfig,
    pub recovery: RecoveryConfig,
    pub rate_limiter: RateLimiterConfig,
    pub api: ApiConfig,
}

impl AppConfig {
    /// Loads `.env` (if present), then layers builder defaults, an optional
    /// config file, and `AGENTFLOW_*` environment overrides (double
    /// underscore as the nesting separator, e.g.
    /// `AGENTFLOW_QUEUE__MAX_RETRIES=5`). `config_path` overrides the
    /// default `config.toml`/`config.yaml` search with a specific file.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::info!(?path, "loaded .env file"),
            Err(_) => tracing::debug!("no .env file found, relying on process environment"),
        }

        let config_file = config_path.unwrap_or("config");
        let builder = ConfigBuilder::builder()
            .set_default("queue.max_retries", crate::constants::QUEUE_MAX_RETRIES)
            .map_err(config_error)?
            .set_default("queue.retry_delay_ms", crate::constants::QUEUE_RETRY_DELAY_MS)
            .map_err(config_error)?
            .set_default("queue.dead_letter_queue", crate::constants::QUEUE_DEAD_LETTER_NAME)
            .map_err(config_error)?
            .set_default("queue.max_queue_size", crate::constants::QUEUE_MAX_SIZE as i64)
            .map_err(config_error)?
            .set_default("queue.message_ttl_secs", crate::constants::QUEUE_MESSAGE_TTL_SECS)
            .map_err(config_error)?
            .set_default(
                "router.max_subscriptions_per_agent",
                crate::constants::MAX_SUBSCRIPTIONS_PER_AGENT as i64,
            )
            .map_err(config_error)?
            .set_default("router.max_topics_per_agent", crate::constants::MAX_TOPICS_PER_AGENT as i64)
            .map_err(config_error)?
            .set_default("router.wildcard_enabled", crate::constants::WILDCARD_ENABLED)
            .map_err(config_error)?
            .set_default("router.delivery_timeout_ms", crate::constants::DELIVERY_TIMEOUT_MS)
            .map_err(config_error)?
            .set_default("transport.port", 8080i64)
            .map_err(config_error)?
            .set_default(
                "transport.heartbeat_interval_ms",
                crate::constants::HEARTBEAT_INTERVAL_MS,
            )
            .map_err(config_error)?
            .set_default("persistence.cache_ttl_secs", crate::constants::CACHE_STATE_TTL_SECS)
            .map_err(config_error)?
            .set_default("recovery.max_retries", crate::constants::RECOVERY_MAX_RETRIES)
            .map_err(config_error)?
            .set_default("recovery.retry_delay_ms", crate::constants::RECOVERY_RETRY_DELAY_MS)
            .map_err(config_error)?
            .set_default("rate_limiter.tokens_per_interval", 10i64)
            .map_err(config_error)?
            .set_default("rate_limiter.interval_ms", 1000i64)
            .map_err(config_error)?
            .set_default("rate_limiter.max_tokens", 20i64)
            .map_err(config_error)?
            .set_default("api.host", "0.0.0.0")
            .map_err(config_error)?
            .set_default("api.port", 8080i64)
            .map_err(config_error)?
            .add_source(File::with_name(config_file).required(false))
            .add_source(Environment::with_prefix("AGENTFLOW").separator("__"));

        builder.build().map_err(config_error)?.try_deserialize().map_err(config_error)
    }
}

fn config_error(err: config::ConfigError) -> AgentflowError {
    AgentflowError::Configuration(err.to_string())
}
