//! WebSocket relay server: accept loop and per-connection I/O pumps.
//!
//! ```text
//! Client A ──┐                      ┌── SendQueue ── Client B
//!            ├── EventRouter ── Room┤
//! Client B ──┘    (doc-keyed)      └── SendQueue ── Client C
//! ```
//!
//! Each accepted connection gets a registry identity and one task driving
//! two pumps: the inbound pump reads frames, decodes them and hands them to
//! the router; the outbound pump drains the connection's send queue. The
//! pumps are select!-multiplexed so neither blocks the other, and routing
//! itself never waits on the network.
//!
//! A connection with no traffic in either direction for the configured idle
//! period is disconnected like any transport error — the relay never
//! accumulates abandoned connections, while a member that only consumes
//! fan-out (a viewer) stays alive as long as its room is active.

use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

use crate::protocol::ClientEvent;
use crate::queue::SendQueue;
use crate::registry::ConnectionRegistry;
use crate::rooms::RoomManager;
use crate::router::EventRouter;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: String,
    /// Unsent events buffered per connection before drop-oldest kicks in.
    pub send_queue_capacity: usize,
    /// Period without traffic in either direction after which a connection
    /// is disconnected.
    pub idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            send_queue_capacity: 256,
            idle_timeout_secs: 300,
        }
    }
}

/// Relay-wide counters. Atomics only — never touched under a lock.
#[derive(Default)]
pub struct RelayStats {
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    events_routed: AtomicU64,
    events_dropped: AtomicU64,
    events_rejected: AtomicU64,
    protocol_errors: AtomicU64,
    idle_disconnects: AtomicU64,
}

/// Point-in-time view of [`RelayStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_connections: u64,
    pub active_connections: u64,
    pub events_routed: u64,
    pub events_dropped: u64,
    pub events_rejected: u64,
    pub protocol_errors: u64,
    pub idle_disconnects: u64,
    pub active_rooms: usize,
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_connected(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_disconnected(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn record_routed(&self) {
        self.events_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.events_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_idle_disconnect(&self) {
        self.idle_disconnects.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, active_rooms: usize) -> StatsSnapshot {
        StatsSnapshot {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            events_routed: self.events_routed.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            events_rejected: self.events_rejected.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            idle_disconnects: self.idle_disconnects.load(Ordering::Relaxed),
            active_rooms,
        }
    }
}

/// The relay server.
///
/// Process-scoped state with explicit construction — build one at startup
/// and clone handles into whatever needs it; clones share the same
/// registry, rooms and counters.
#[derive(Clone)]
pub struct RelayServer {
    config: ServerConfig,
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomManager>,
    router: Arc<EventRouter>,
    stats: Arc<RelayStats>,
}

impl RelayServer {
    /// Create a relay with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomManager::new());
        let stats = Arc::new(RelayStats::new());
        let router = Arc::new(EventRouter::new(
            registry.clone(),
            rooms.clone(),
            stats.clone(),
        ));
        Self {
            config,
            registry,
            rooms,
            router,
            stats,
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Accept connections forever.
    pub async fn run(&self) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("relay listening on {}", self.config.bind_addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("tcp connection from {addr}");

            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(stream, None).await {
                    log::error!("connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Drive one connection to completion.
    ///
    /// Public so an embedding layer that has already authenticated the
    /// transport can hand the relay a verified `identity` label; the relay
    /// treats it as opaque and performs no verification of its own.
    pub async fn handle_connection(
        &self,
        stream: TcpStream,
        identity: Option<String>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let queue = Arc::new(SendQueue::new(self.config.send_queue_capacity));
        let conn_id = self.registry.register(queue.clone());
        self.stats.record_connected();
        match &identity {
            Some(who) => log::info!("connection {conn_id} established for {who}"),
            None => log::info!("connection {conn_id} established"),
        }

        let idle_timeout = Duration::from_secs(self.config.idle_timeout_secs);
        let idle = tokio::time::sleep(idle_timeout);
        tokio::pin!(idle);

        // Inbound and outbound pumps, multiplexed. Breaking out of the loop
        // is the only way a connection ends, so teardown below runs exactly
        // once per connection.
        loop {
            tokio::select! {
                () = &mut idle => {
                    log::info!("connection {conn_id} idle for {idle_timeout:?}, disconnecting");
                    self.stats.record_idle_disconnect();
                    let _ = ws_sender.send(Message::Close(None)).await;
                    break;
                }

                frame = ws_receiver.next() => {
                    idle.as_mut().reset(tokio::time::Instant::now() + idle_timeout);
                    match frame {
                        Some(Ok(Message::Binary(data))) => {
                            let bytes: Vec<u8> = data.into();
                            match ClientEvent::decode(&bytes) {
                                Ok(event) => self.router.dispatch(conn_id, event),
                                Err(e) => {
                                    // Undecodable frame: close this connection,
                                    // leave everyone else alone.
                                    log::warn!("protocol error on {conn_id}: {e}");
                                    self.stats.record_protocol_error();
                                    let _ = ws_sender.send(Message::Close(None)).await;
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Text(_))) => {
                            log::warn!("protocol error on {conn_id}: unexpected text frame");
                            self.stats.record_protocol_error();
                            let _ = ws_sender.send(Message::Close(None)).await;
                            break;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if ws_sender.send(Message::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            log::debug!("connection {conn_id} closed by client");
                            break;
                        }
                        Some(Err(e)) => {
                            log::debug!("transport error on {conn_id}: {e}");
                            break;
                        }
                        Some(Ok(_)) => {}
                    }
                }

                event = queue.pop() => {
                    match event {
                        Some(event) => {
                            match event.encode() {
                                Ok(encoded) => {
                                    if ws_sender.send(Message::Binary(encoded.into())).await.is_err() {
                                        break;
                                    }
                                    // Delivery counts as activity: a member
                                    // that only consumes fan-out is not idle.
                                    idle.as_mut().reset(tokio::time::Instant::now() + idle_timeout);
                                }
                                Err(e) => log::error!("failed to encode outbound event: {e}"),
                            }
                        }
                        // Queue closed from the registry side.
                        None => break,
                    }
                }
            }
        }

        // Single teardown path: membership first, then registry.
        self.router.handle_disconnect(conn_id);
        self.stats.record_disconnected();
        log::info!("connection {conn_id} torn down");
        Ok(())
    }

    /// Point-in-time relay statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(self.rooms.room_count())
    }

    /// The configured bind address.
    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    /// Room manager handle (membership inspection).
    pub fn rooms(&self) -> &Arc<RoomManager> {
        &self.rooms
    }

    /// Connection registry handle.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Event router handle.
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:9090");
        assert_eq!(config.send_queue_capacity, 256);
        assert_eq!(config.idle_timeout_secs, 300);
    }

    #[test]
    fn test_server_creation() {
        let server = RelayServer::with_defaults();
        assert_eq!(server.bind_addr(), "127.0.0.1:9090");
        assert_eq!(server.rooms().room_count(), 0);
        assert!(server.registry().is_empty());
    }

    #[test]
    fn test_stats_initial() {
        let server = RelayServer::with_defaults();
        assert_eq!(server.stats(), StatsSnapshot::default());
    }

    #[test]
    fn test_clones_share_state() {
        let server = RelayServer::with_defaults();
        let clone = server.clone();

        let queue = Arc::new(crate::queue::SendQueue::new(4));
        let id = server.registry().register(queue);

        assert!(clone.registry().queue_of(id).is_some());
    }
}
