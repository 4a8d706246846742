//! WebSocket Battle Relay
//!
//! Async WebSocket server that pairs peers into rooms and relays their
//! frames. The relay validates writers and orders delivery; it never
//! looks inside match state.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::transport::protocol::{ClientFrame, ErrorCode, FrameError, ServerFrame};
use crate::transport::session::{RoomConfig, RoomError, RoomManager};
use crate::transport::PeerId;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Idle timeout for connections that never joined a room.
    pub connection_timeout: Duration,
    /// How long a lone peer may wait for an opponent (seconds).
    pub waiting_room_timeout_secs: i64,
    /// Backstop deadline for an open turn (seconds).
    pub turn_timeout_secs: i64,
    /// Relay version string.
    pub version: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            max_connections: 1000,
            connection_timeout: Duration::from_secs(300),
            waiting_room_timeout_secs: 120,
            turn_timeout_secs: 30,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl RelayConfig {
    /// The per-room slice of this configuration.
    pub fn room_config(&self) -> RoomConfig {
        RoomConfig {
            waiting_timeout_secs: self.waiting_room_timeout_secs,
            turn_timeout_secs: self.turn_timeout_secs,
        }
    }
}

/// Relay errors.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection limit reached.
    #[error("Connection limit reached")]
    ConnectionLimitReached,

    /// Room error.
    #[error("Room error: {0}")]
    Room(#[from] RoomError),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Connected client state.
struct ConnectedClient {
    /// Peer identifier assigned at connect time.
    peer_id: PeerId,
    /// Connection time.
    #[allow(dead_code)]
    connected_at: Instant,
    /// Last activity.
    last_activity: Instant,
    /// Frame sender (for direct messaging to this client).
    #[allow(dead_code)]
    sender: mpsc::Sender<ServerFrame>,
}

/// The battle relay.
pub struct BattleRelay {
    /// Relay configuration.
    config: RelayConfig,
    /// Room manager.
    rooms: Arc<RoomManager>,
    /// Connected clients.
    clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl BattleRelay {
    /// Create a new relay.
    pub fn new(config: RelayConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let rooms = Arc::new(RoomManager::new(config.room_config()));

        Self {
            config,
            rooms,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Run the relay.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), RelayError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Battle relay listening on {}", self.config.bind_addr);

        let sweep_rooms = self.rooms.clone();
        let sweep_handle = tokio::spawn(async move {
            Self::run_sweep_loop(sweep_rooms).await;
        });

        let cleanup_clients = self.clients.clone();
        let cleanup_rooms = self.rooms.clone();
        let idle_timeout = self.config.connection_timeout;
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_clients, cleanup_rooms, idle_timeout).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        sweep_handle.abort();
        cleanup_handle.abort();

        Ok(())
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let clients = self.clients.clone();
        let rooms = self.rooms.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (frame_tx, mut frame_rx) = mpsc::channel::<ServerFrame>(64);

            let peer_id = PeerId::new_random();
            {
                let mut clients = clients.write().await;
                clients.insert(addr, ConnectedClient {
                    peer_id,
                    connected_at: Instant::now(),
                    last_activity: Instant::now(),
                    sender: frame_tx.clone(),
                });
            }

            // Serialize outgoing frames onto the socket.
            let sender_task = tokio::spawn(async move {
                while let Some(frame) = frame_rx.recv().await {
                    let text = match frame.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize frame: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let frame = match ClientFrame::from_json(&text) {
                                    Ok(f) => f,
                                    Err(e) => {
                                        debug!("Invalid frame from {}: {}", addr, e);
                                        let _ = frame_tx.send(ServerFrame::Error(FrameError {
                                            code: ErrorCode::InvalidFrame,
                                            message: "Invalid frame format".to_string(),
                                        })).await;
                                        continue;
                                    }
                                };

                                {
                                    let mut clients = clients.write().await;
                                    if let Some(client) = clients.get_mut(&addr) {
                                        client.last_activity = Instant::now();
                                    }
                                }

                                Self::handle_client_frame(
                                    addr,
                                    frame,
                                    &clients,
                                    &rooms,
                                    &frame_tx,
                                ).await;
                            }
                            Some(Ok(Message::Ping(_))) => {
                                let _ = frame_tx.send(ServerFrame::Pong {
                                    timestamp: 0,
                                    server_time: std::time::SystemTime::now()
                                        .duration_since(std::time::UNIX_EPOCH)
                                        .unwrap_or_default()
                                        .as_millis() as u64,
                                }).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = frame_tx.send(ServerFrame::Shutdown {
                            reason: "Relay shutting down".to_string(),
                        }).await;
                        break;
                    }
                }
            }

            sender_task.abort();

            // Tell the opponent and drop the dead room before forgetting
            // the client.
            rooms.leave(peer_id).await;
            {
                let mut clients = clients.write().await;
                clients.remove(&addr);
            }

            info!("Client {} cleaned up", addr);
        });
    }

    /// Handle one parsed client frame.
    async fn handle_client_frame(
        addr: SocketAddr,
        frame: ClientFrame,
        clients: &Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        rooms: &Arc<RoomManager>,
        sender: &mpsc::Sender<ServerFrame>,
    ) {
        let peer_id = {
            let clients = clients.read().await;
            match clients.get(&addr) {
                Some(c) => c.peer_id,
                None => {
                    debug!("Frame from unregistered client {}", addr);
                    return;
                }
            }
        };

        match frame {
            ClientFrame::Join { room } => {
                match rooms.join(room, peer_id, sender.clone()).await {
                    Ok((_, seat)) => {
                        debug!("Client {} seated as {:?}", addr, seat);
                    }
                    Err(e) => {
                        debug!("Join failed for {}: {}", addr, e);
                        let _ = sender.send(ServerFrame::Error(FrameError {
                            code: e.code(),
                            message: e.to_string(),
                        })).await;
                    }
                }
            }

            ClientFrame::Ping { timestamp } => {
                let _ = sender.send(ServerFrame::Pong {
                    timestamp,
                    server_time: std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_millis() as u64,
                }).await;
            }

            ClientFrame::Leave => {
                rooms.leave(peer_id).await;
            }

            frame => {
                let Some(room) = rooms.room_of_peer(peer_id).await else {
                    let e = RoomError::NotInRoom;
                    let _ = sender.send(ServerFrame::Error(FrameError {
                        code: e.code(),
                        message: e.to_string(),
                    })).await;
                    return;
                };

                let result = {
                    let mut session = room.write().await;
                    let Some(seat) = session.seat_of(peer_id) else {
                        return;
                    };
                    session.route(seat, frame, Utc::now())
                };

                match result {
                    Ok(deliveries) => {
                        let session = room.read().await;
                        session.deliver(deliveries).await;
                    }
                    Err(e) => {
                        debug!("Rejected frame from {}: {}", addr, e);
                        let _ = sender.send(ServerFrame::Error(FrameError {
                            code: e.code(),
                            message: e.to_string(),
                        })).await;
                    }
                }
            }
        }
    }

    /// Run room housekeeping once a second.
    async fn run_sweep_loop(rooms: Arc<RoomManager>) {
        let mut interval = interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            rooms.sweep(Utc::now()).await;
        }
    }

    /// Evict connections that idled without ever joining a room.
    async fn run_cleanup_loop(
        clients: Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>,
        rooms: Arc<RoomManager>,
        idle_timeout: Duration,
    ) {
        let mut interval = interval(Duration::from_secs(60));

        loop {
            interval.tick().await;
            Self::evict_idle_connections(&clients, &rooms, idle_timeout, Instant::now()).await;
        }
    }

    /// One eviction pass. The clients guard is never held across a room
    /// lookup.
    async fn evict_idle_connections(
        clients: &RwLock<BTreeMap<SocketAddr, ConnectedClient>>,
        rooms: &RoomManager,
        idle_timeout: Duration,
        now: Instant,
    ) {
        let idle: Vec<(SocketAddr, PeerId)> = {
            let clients = clients.read().await;
            clients
                .iter()
                .filter(|(_, c)| now.duration_since(c.last_activity) > idle_timeout)
                .map(|(addr, c)| (*addr, c.peer_id))
                .collect()
        };

        for (addr, peer_id) in idle {
            // Seated peers stay; the room sweep owns their lifecycle.
            if rooms.room_of_peer(peer_id).await.is_some() {
                continue;
            }
            rooms.leave(peer_id).await;
            let mut clients = clients.write().await;
            if clients.remove(&addr).is_some() {
                info!("Removed idle client {}", addr);
            }
        }
    }

    /// Shutdown the relay.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get active room count.
    pub async fn room_count(&self) -> usize {
        self.rooms.room_count().await
    }
}
