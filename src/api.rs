//! HTTP surface: health, status and metrics endpoints, plus the websocket
//! upgrade route that hands connections off to [`crate::transport::Transport`].
//! Shaped the way a production `ApiServer` wires an `axum::Router`: one
//! `Clone`-able state struct, routes registered against it, a
//! `TraceLayer`/`CorsLayer` stack, served from `run()`.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ApiConfig;
use crate::error::{AgentflowError, Result};
use crate::monitoring::SystemMonitor;
use crate::orchestrator::Orchestrator;
use crate::transport::{axum_adapter, Transport};

const ROUTE_HEALTH: &str = "/health";
const ROUTE_STATUS: &str = "/status";
const ROUTE_METRICS: &str = "/metrics";
const ROUTE_METRICS_HISTORY: &str = "/metrics/history";
const DEFAULT_WEBSOCKET_ROUTE: &str = "/ws";

#[derive(Clone)]
pub struct ApiServer {
    config: ApiConfig,
    orchestrator: Arc<Orchestrator>,
    monitor: Arc<SystemMonitor>,
    transport: Arc<Transport>,
    max_connections: Option<usize>,
    websocket_path: String,
}

impl ApiServer {
    pub fn new(
        config: ApiConfig,
        orchestrator: Arc<Orchestrator>,
        monitor: Arc<SystemMonitor>,
        transport: Arc<Transport>,
        max_connections: Option<usize>,
        websocket_path: Option<String>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            monitor,
            transport,
            max_connections,
            websocket_path: websocket_path.unwrap_or_else(|| DEFAULT_WEBSOCKET_ROUTE.to_string()),
        }
    }

    pub fn build_router(&self) -> Router {
        Router::new()
            .route(ROUTE_HEALTH, get(health_check))
            .route(ROUTE_STATUS, get(get_status))
            .route(ROUTE_METRICS, get(get_metrics))
            .route(ROUTE_METRICS_HISTORY, get(get_metrics_history))
            .route(&self.websocket_path, get(upgrade_websocket))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.clone())
    }

    pub async fn run(&self) -> Result<()> {
        let app = self.build_router();
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|err| AgentflowError::Transport(err.to_string()))?;

        info!(%addr, "API server listening");
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|err| AgentflowError::Transport(err.to_string()))?;
        Ok(())
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_status(State(api): State<ApiServer>) -> Json<Value> {
    Json(json!({
        "orchestratorStatus": format!("{:?}", api.orchestrator.status().await),
        "agentCount": api.orchestrator.agent_count().await,
        "connectionCount": api.transport.connection_count().await,
    }))
}

async fn get_metrics(State(api): State<ApiServer>) -> std::result::Result<Json<Value>, StatusCode> {
    match api.monitor.latest().await {
        Some(snapshot) => Ok(Json(serde_json::to_value(snapshot).unwrap_or(Value::Null))),
        None => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

async fn get_metrics_history(State(api): State<ApiServer>) -> Json<Value> {
    Json(serde_json::to_value(api.monitor.history().await).unwrap_or(Value::Null))
}

/// Upgrades to a websocket, rejecting the connection with 503 if
/// `maxConnections` is configured and already reached.
async fn upgrade_websocket(
    State(api): State<ApiServer>,
    ConnectInfo(_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> axum::response::Response {
    if let Some(max) = api.max_connections {
        if api.transport.connection_count().await >= max {
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
    }

    let transport = api.transport.clone();
    ws.on_upgrade(move |socket| axum_adapter::handle_socket(transport, socket))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{InMemoryCache, InMemoryQueueBackend, InMemoryStore};
    use crate::monitoring::MonitoringConfig;
    use crate::persistence::PersistenceManager;
    use crate::queue::{MessageQueue, QueueConfig};
    use crate::router::{Router as PubSubRouter, RouterConfig};
    use crate::transport::TransportConfig;

    fn api_server() -> ApiServer {
        let router = Arc::new(PubSubRouter::new(RouterConfig::default()));
        let queue = Arc::new(MessageQueue::new(Arc::new(InMemoryQueueBackend::new()), QueueConfig::default()));
        let (persistence, _events) = PersistenceManager::new(
            Arc::new(InMemoryCache::new()),
            Arc::new(InMemoryStore::new()),
            Default::default(),
        );
        let orchestrator = Arc::new(Orchestrator::new(router, queue, Arc::new(persistence)));
        let monitor = Arc::new(SystemMonitor::new(orchestrator.clone(), MonitoringConfig::default()));
        let (transport, _rx) = Transport::new(TransportConfig::default());
        ApiServer::new(
            ApiConfig { host: "127.0.0.1".to_string(), port: 0 },
            orchestrator,
            monitor,
            transport,
            Some(2),
            None,
        )
    }

    #[tokio::test]
    async fn health_check_reports_ok() {
        let Json(body) = health_check().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn status_reflects_orchestrator_state() {
        let api = api_server();
        api.orchestrator.initialize().await.unwrap();
        let Json(body) = get_status(State(api)).await;
        assert_eq!(body["agentCount"], 0);
    }

    #[tokio::test]
    async fn metrics_are_unavailable_before_first_collection() {
        let api = api_server();
        assert!(get_metrics(State(api)).await.is_err());
    }
}
