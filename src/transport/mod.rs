//! Websocket transport: connection registry, heartbeat loop,
//! and inbound frame validation. Connection handling follows the
//! split-sink/split-stream, spawned-task-per-direction shape used for
//! event-streaming websockets, adapted so outbound sending goes through a
//! [`ConnectionSink`] seam instead of a bare `axum` type — that keeps the
//! heartbeat and frame-validation logic testable without a live socket.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AgentflowError, Result};
use crate::protocol;

#[derive(Debug, Clone)]
pub enum TransportEvent {
    Connection(String),
    Message(String, protocol::Message),
    Close(String),
    Error(Option<String>, String),
    Heartbeat(String),
}

/// Outbound half of a connection. Implemented for `axum`'s websocket sink
/// in [`axum_adapter`]; tests implement it over an in-memory channel.
#[async_trait]
pub trait ConnectionSink: Send {
    async fn send_text(&mut self, text: String) -> Result<()>;
    async fn send_ping(&mut self) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

struct Connection {
    sink: Mutex<Box<dyn ConnectionSink>>,
    is_alive: AtomicBool,
    last_heartbeat: AtomicI64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TransportConfig {
    pub heartbeat_interval_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: crate::constants::HEARTBEAT_INTERVAL_MS,
        }
    }
}

pub struct Transport {
    config: TransportConfig,
    connections: RwLock<HashMap<String, Connection>>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl Transport {
    pub fn new(config: TransportConfig) -> (Arc<Self>, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                config,
                connections: RwLock::new(HashMap::new()),
                events: tx,
            }),
            rx,
        )
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    /// Registers a new connection's outbound sink and assigns it an opaque
    /// id. Returns the id so the caller can wire up the corresponding
    /// inbound read loop to [`Transport::handle_inbound_text`].
    pub async fn register(&self, sink: Box<dyn ConnectionSink>) -> String {
        let id = Uuid::new_v4().to_string();
        self.connections.write().await.insert(
            id.clone(),
            Connection {
                sink: Mutex::new(sink),
                is_alive: AtomicBool::new(true),
                last_heartbeat: AtomicI64::new(chrono::Utc::now().timestamp_millis()),
            },
        );
        self.emit(TransportEvent::Connection(id.clone()));
        id
    }

    pub async fn deregister(&self, id: &str) {
        if self.connections.write().await.remove(id).is_some() {
            self.emit(TransportEvent::Close(id.to_string()));
        }
    }

    /// Parses and validates one inbound frame. On success, emits
    /// `MESSAGE(id, m)`. On failure, sends an ERROR frame back to the
    /// originator and emits `ERROR(id, err)` without emitting `MESSAGE`.
    pub async fn handle_inbound_text(&self, id: &str, text: &str) {
        let outcome = serde_json::from_str::<Value>(text)
            .map_err(AgentflowError::from)
            .and_then(|raw| protocol::validate(&raw));

        match outcome {
            Ok(message) => self.emit(TransportEvent::Message(id.to_string(), message)),
            Err(err) => {
                warn!(connection_id = id, error = %err, "rejected inbound frame");
                let frame = error_frame(&err);
                if let Err(send_err) = self.send_raw(id, &frame).await {
                    warn!(connection_id = id, error = %send_err, "failed to deliver error frame");
                }
                self.emit(TransportEvent::Error(Some(id.to_string()), err.to_string()));
            }
        }
    }

    async fn send_raw(&self, id: &str, message: &Value) -> Result<()> {
        let connections = self.connections.read().await;
        let connection = connections
            .get(id)
            .ok_or_else(|| AgentflowError::Transport(format!("Connection {id} not found")))?;
        let text = serde_json::to_string(message)?;
        connection.sink.lock().await.send_text(text).await
    }

    pub async fn send(&self, id: &str, message: &Value) -> Result<()> {
        self.send_raw(id, message).await
    }

    /// Per-connection send errors are logged and swallowed: one bad
    /// connection must not fail the whole broadcast.
    pub async fn broadcast(&self, message: &Value) {
        let ids: Vec<String> = self.connections.read().await.keys().cloned().collect();
        for id in ids {
            if let Err(err) = self.send_raw(&id, message).await {
                warn!(connection_id = %id, error = %err, "broadcast delivery failed");
            }
        }
    }

    /// Called on receipt of a pong for `id`.
    pub async fn record_pong(&self, id: &str) {
        let connections = self.connections.read().await;
        if let Some(connection) = connections.get(id) {
            connection.is_alive.store(true, Ordering::Relaxed);
            connection
                .last_heartbeat
                .store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);
            self.emit(TransportEvent::Heartbeat(id.to_string()));
        }
    }

    /// One heartbeat tick: terminates connections that didn't pong since
    /// the previous tick, and pings the rest.
    pub async fn heartbeat_tick(&self) {
        let ids: Vec<String> = self.connections.read().await.keys().cloned().collect();
        for id in ids {
            let should_terminate = {
                let connections = self.connections.read().await;
                match connections.get(&id) {
                    Some(connection) => !connection.is_alive.load(Ordering::Relaxed),
                    None => continue,
                }
            };

            if should_terminate {
                info!(connection_id = %id, "no pong since last heartbeat, terminating");
                let mut connections = self.connections.write().await;
                if let Some(connection) = connections.remove(&id) {
                    let _ = connection.sink.lock().await.close().await;
                }
                drop(connections);
                self.emit(TransportEvent::Close(id));
            } else {
                let connections = self.connections.read().await;
                if let Some(connection) = connections.get(&id) {
                    connection.is_alive.store(false, Ordering::Relaxed);
                    if let Err(err) = connection.sink.lock().await.send_ping().await {
                        warn!(connection_id = %id, error = %err, "ping failed");
                    }
                }
            }
        }
    }

    /// Spawns the heartbeat loop on the current runtime. Returns its
    /// `JoinHandle` so callers can abort it on shutdown.
    pub fn spawn_heartbeat(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let transport = self.clone();
        let interval = std::time::Duration::from_millis(self.config.heartbeat_interval_ms);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                transport.heartbeat_tick().await;
            }
        })
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

fn error_frame(err: &AgentflowError) -> Value {
    json!({
        "type": "error",
        "timestamp": chrono::Utc::now().timestamp_millis(),
        "sender": "transport",
        "receiver": "",
        "correlationId": "error",
        "version": protocol::PROTOCOL_VERSION,
        "error": err.to_string(),
        "code": err.code().as_str(),
    })
}

/// Adapter wiring [`Transport`] to real `axum` websockets.
pub mod axum_adapter {
    use super::*;
    use axum::extract::ws::{Message as WsMessage, WebSocket};
    use futures::stream::SplitSink;
    use futures::{SinkExt, StreamExt};

    struct AxumSink(SplitSink<WebSocket, WsMessage>);

    #[async_trait]
    impl ConnectionSink for AxumSink {
        async fn send_text(&mut self, text: String) -> Result<()> {
            self.0
                .send(WsMessage::Text(text))
                .await
                .map_err(|e| AgentflowError::Transport(e.to_string()))
        }

        async fn send_ping(&mut self) -> Result<()> {
            self.0
                .send(WsMessage::Ping(Vec::new().into()))
                .await
                .map_err(|e| AgentflowError::Transport(e.to_string()))
        }

        async fn close(&mut self) -> Result<()> {
            let _ = self.0.send(WsMessage::Close(None)).await;
            Ok(())
        }
    }

    /// Registers `socket` with `transport` and drives its inbound loop
    /// until the peer disconnects.
    pub async fn handle_socket(transport: Arc<Transport>, socket: WebSocket) {
        let (sink, mut stream) = socket.split();
        let id = transport.register(Box::new(AxumSink(sink))).await;
        debug!(connection_id = %id, "websocket connected");

        while let Some(frame) = stream.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => transport.handle_inbound_text(&id, &text).await,
                Ok(WsMessage::Pong(_)) => transport.record_pong(&id).await,
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => {}
                Err(_) => break,
            }
        }

        transport.deregister(&id).await;
        debug!(connection_id = %id, "websocket disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeSink {
        sent: Arc<StdMutex<Vec<String>>>,
        pings: Arc<StdMutex<u32>>,
        fail_next: bool,
    }

    #[async_trait]
    impl ConnectionSink for FakeSink {
        async fn send_text(&mut self, text: String) -> Result<()> {
            if self.fail_next {
                return Err(AgentflowError::Transport("boom".to_string()));
            }
            self.sent.lock().unwrap().push(text);
            Ok(())
        }

        async fn send_ping(&mut self) -> Result<()> {
            *self.pings.lock().unwrap() += 1;
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn heartbeat_json(correlation_id: &str) -> Value {
        json!({
            "type": "heartbeat",
            "timestamp": 1_700_000_000_000i64,
            "sender": "a1",
            "receiver": "orch",
            "correlationId": correlation_id,
            "version": protocol::PROTOCOL_VERSION,
            "status": "ready",
            "lastHealthCheck": 1_700_000_000_000i64,
        })
    }

    #[tokio::test]
    async fn valid_inbound_frame_emits_message_event() {
        let (transport, mut events) = Transport::new(TransportConfig::default());
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let id = transport
            .register(Box::new(FakeSink {
                sent: sent.clone(),
                ..Default::default()
            }))
            .await;
        events.recv().await.unwrap(); // Connection event

        let text = heartbeat_json("c1").to_string();
        transport.handle_inbound_text(&id, &text).await;

        match events.recv().await.unwrap() {
            TransportEvent::Message(connection_id, message) => {
                assert_eq!(connection_id, id);
                assert_eq!(message.type_name(), "heartbeat");
            }
            other => panic!("expected Message event, got {other:?}"),
        }
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_inbound_frame_sends_error_and_emits_error_event() {
        let (transport, mut events) = Transport::new(TransportConfig::default());
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let id = transport
            .register(Box::new(FakeSink {
                sent: sent.clone(),
                ..Default::default()
            }))
            .await;
        events.recv().await.unwrap();

        transport.handle_inbound_text(&id, "not json").await;

        match events.recv().await.unwrap() {
            TransportEvent::Error(connection_id, _) => assert_eq!(connection_id, Some(id)),
            other => panic!("expected Error event, got {other:?}"),
        }
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let frame: Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(frame["code"], "INVALID_MESSAGE");
        assert_eq!(frame["correlationId"], "error");
    }

    #[tokio::test]
    async fn send_fails_for_unknown_connection() {
        let (transport, _events) = Transport::new(TransportConfig::default());
        let err = transport.send("missing", &json!({})).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn broadcast_swallows_individual_failures() {
        let (transport, mut events) = Transport::new(TransportConfig::default());
        let good_sent = Arc::new(StdMutex::new(Vec::new()));
        transport
            .register(Box::new(FakeSink {
                sent: good_sent.clone(),
                ..Default::default()
            }))
            .await;
        transport
            .register(Box::new(FakeSink {
                fail_next: true,
                ..Default::default()
            }))
            .await;
        events.recv().await.unwrap();
        events.recv().await.unwrap();

        transport.broadcast(&json!({"x": 1})).await;
        assert_eq!(good_sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn heartbeat_terminates_connection_with_no_pong() {
        let (transport, mut events) = Transport::new(TransportConfig::default());
        let pings = Arc::new(StdMutex::new(0));
        transport
            .register(Box::new(FakeSink {
                pings: pings.clone(),
                ..Default::default()
            }))
            .await;
        events.recv().await.unwrap();

        // First tick: alive, so it gets pinged and flipped to not-alive.
        transport.heartbeat_tick().await;
        assert_eq!(*pings.lock().unwrap(), 1);
        assert_eq!(transport.connection_count().await, 1);

        // Second tick with no intervening pong: terminated.
        transport.heartbeat_tick().await;
        assert_eq!(transport.connection_count().await, 0);
        match events.recv().await.unwrap() {
            TransportEvent::Close(_) => {}
            other => panic!("expected Close event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn pong_keeps_connection_alive() {
        let (transport, mut events) = Transport::new(TransportConfig::default());
        let id = transport.register(Box::new(FakeSink::default())).await;
        events.recv().await.unwrap();

        transport.heartbeat_tick().await;
        transport.record_pong(&id).await;
        match events.recv().await.unwrap() {
            TransportEvent::Heartbeat(connection_id) => assert_eq!(connection_id, id),
            other => panic!("expected Heartbeat event, got {other:?}"),
        }

        transport.heartbeat_tick().await;
        assert_eq!(transport.connection_count().await, 1);
    }
}
