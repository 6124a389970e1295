use std::sync::Arc;
use std::time::Duration;

use agentflow_core::api::ApiServer;
use agentflow_core::capability::{InMemoryCache, InMemoryQueueBackend, InMemoryStore};
use agentflow_core::config::AppConfig;
use agentflow_core::monitoring::{MonitoringConfig, SystemMonitor};
use agentflow_core::orchestrator::Orchestrator;
use agentflow_core::persistence::{PersistenceEvent, PersistenceManager};
use agentflow_core::queue::MessageQueue;
use agentflow_core::rate_limit::TokenBucket;
use agentflow_core::router::Router;
use agentflow_core::transport::{Transport, TransportEvent};
use agentflow_core::Result;
use clap::Parser;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "agentflow", about = "Multi-agent orchestration runtime")]
struct Cli {
    /// Path to a config file, overriding the default `config.toml`/`config.yaml` search.
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("starting agentflow-core");

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;

    let router = Arc::new(Router::new(config.router));
    let queue = Arc::new(MessageQueue::new(
        Arc::new(InMemoryQueueBackend::new()),
        config.queue.policy,
    ));
    let (persistence, persistence_events) = PersistenceManager::new(
        Arc::new(InMemoryCache::new()),
        Arc::new(InMemoryStore::new()),
        config.persistence,
    );
    let persistence = Arc::new(persistence);

    let orchestrator = Arc::new(Orchestrator::new(router, queue, persistence.clone()));
    orchestrator.initialize().await?;

    let (transport, transport_events) = Transport::new(config.transport.policy);
    orchestrator.attach_transport(transport.clone()).await;
    transport.spawn_heartbeat();

    let monitor = Arc::new(SystemMonitor::new(orchestrator.clone(), MonitoringConfig::default()));
    monitor.start().await;

    let rate_limiter = Arc::new(TokenBucket::new(config.rate_limiter));

    tokio::spawn(log_persistence_events(persistence_events));
    tokio::spawn(sync_states_periodically(persistence));
    tokio::spawn(drain_transport_events(
        orchestrator.clone(),
        transport.clone(),
        rate_limiter,
        transport_events,
    ));

    let api = ApiServer::new(
        config.api,
        orchestrator,
        monitor,
        transport,
        config.transport.max_connections,
        config.transport.path,
    );

    if let Err(err) = api.run().await {
        error!(error = %err, "API server failed");
    }

    Ok(())
}

async fn log_persistence_events(mut events: UnboundedReceiver<PersistenceEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            PersistenceEvent::Error(err) => warn!(error = %err, "persistence operation failed"),
            PersistenceEvent::StatesSynced => info!("persistence reconciliation pass completed"),
        }
    }
}

/// Forwards every inbound `message` event to the orchestrator, gated by the
/// rate limiter, and writes the response (or logs a failure) back to the
/// originating connection.
async fn drain_transport_events(
    orchestrator: Arc<Orchestrator>,
    transport: Arc<Transport>,
    rate_limiter: Arc<TokenBucket>,
    mut events: UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = events.recv().await {
        let TransportEvent::Message(connection_id, message) = event else {
            continue;
        };

        if !rate_limiter.acquire_token().await {
            warn!(connection_id = %connection_id, "rejecting inbound message, rate limit exhausted");
            continue;
        }

        match orchestrator.handle_message(message, None).await {
            Ok(reply) => match serde_json::to_value(&reply) {
                Ok(value) => {
                    if let Err(err) = transport.send(&connection_id, &value).await {
                        warn!(connection_id = %connection_id, error = %err, "failed to deliver response");
                    }
                }
                Err(err) => warn!(connection_id = %connection_id, error = %err, "failed to encode response"),
            },
            Err(err) => warn!(connection_id = %connection_id, error = %err, "message handling failed"),
        }
    }
}

async fn sync_states_periodically(persistence: Arc<PersistenceManager>) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        if let Err(err) = persistence.sync_states().await {
            warn!(error = %err, "state reconciliation pass failed");
        }
    }
}
