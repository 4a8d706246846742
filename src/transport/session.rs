//! Room Session Management
//!
//! Pairs two peers into a room, validates who may write what, and fans
//! frames out in arrival order. All routing decisions live here as
//! plain synchronous logic; the WebSocket relay and the in-process
//! loopback both drive the same code.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::battle::driver::BroadcastTarget;
use crate::battle::player::Seat;
use crate::core::rng::derive_match_seed;
use crate::transport::protocol::{ClientFrame, ErrorCode, ServerFrame};
use crate::transport::{PeerId, RoomId};

/// Room lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomLifecycle {
    /// One peer inside, waiting for an opponent.
    Waiting,
    /// Both peers present, match underway.
    InMatch,
    /// Room is done; it will be swept away.
    Closed,
}

/// Configuration for a room.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// How long a lone peer may wait for an opponent before the room
    /// closes (seconds).
    pub waiting_timeout_secs: i64,
    /// Backstop deadline for an open turn (seconds). Generously longer
    /// than the in-match countdown; peers only log when it fires.
    pub turn_timeout_secs: i64,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            waiting_timeout_secs: 120,
            turn_timeout_secs: 30,
        }
    }
}

/// A peer occupying a seat in a room.
pub struct RoomPeer {
    /// Peer identifier.
    pub peer_id: PeerId,
    /// The seat it occupies.
    pub seat: Seat,
    /// Frame channel to this peer.
    pub sender: mpsc::Sender<ServerFrame>,
}

/// The relay's backstop timer for an open turn.
struct OpenTurn {
    turn_id: u32,
    expires_at: DateTime<Utc>,
}

/// A two-peer room.
///
/// The first peer to join takes [`Seat::Host`] and is the room
/// authority; the second takes [`Seat::Guest`]. Frames are validated
/// and fanned out in arrival order per sender, echo to the sender
/// included, which is what makes the peers' replicated state converge.
pub struct RoomSession {
    /// Unique room identifier.
    pub id: RoomId,
    /// Room name used for joining.
    pub name: String,
    config: RoomConfig,
    state: RoomLifecycle,
    peers: Vec<RoomPeer>,
    next_turn_id: u32,
    open_turn: Option<OpenTurn>,
    created_at: DateTime<Utc>,
}

impl RoomSession {
    /// Create an empty room.
    pub fn new(id: RoomId, name: String, config: RoomConfig, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            config,
            state: RoomLifecycle::Waiting,
            peers: Vec::with_capacity(2),
            next_turn_id: 0,
            open_turn: None,
            created_at,
        }
    }

    /// Current lifecycle state.
    pub fn lifecycle(&self) -> RoomLifecycle {
        self.state
    }

    /// Number of seated peers.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Whether a peer can still join.
    pub fn is_open(&self) -> bool {
        self.state == RoomLifecycle::Waiting && self.peers.len() < 2
    }

    /// The seat that owns room state.
    pub fn authority_seat() -> Seat {
        Seat::Host
    }

    /// The seat a peer occupies, if seated.
    pub fn seat_of(&self, peer_id: PeerId) -> Option<Seat> {
        self.peers
            .iter()
            .find(|p| p.peer_id == peer_id)
            .map(|p| p.seat)
    }

    /// Seat a peer.
    ///
    /// Returns the assigned seat and the frames to send: a `Joined` for
    /// the new peer, plus `MatchReady` for both once the room fills.
    pub fn join(
        &mut self,
        peer_id: PeerId,
        sender: mpsc::Sender<ServerFrame>,
    ) -> Result<(Seat, Vec<(Seat, ServerFrame)>), RoomError> {
        if self.state == RoomLifecycle::Closed {
            return Err(RoomError::Closed);
        }
        if self.peers.len() >= 2 {
            return Err(RoomError::RoomFull);
        }
        if self.seat_of(peer_id).is_some() {
            return Err(RoomError::AlreadyInRoom);
        }

        let seat = if self.peers.is_empty() {
            Seat::Host
        } else {
            Seat::Guest
        };
        self.peers.push(RoomPeer { peer_id, seat, sender });

        let mut deliveries = vec![(
            seat,
            ServerFrame::Joined {
                room_id: self.id,
                room: self.name.clone(),
                seat,
                authority: seat == Self::authority_seat(),
            },
        )];

        if self.peers.len() == 2 {
            self.state = RoomLifecycle::InMatch;
            let match_seed = self.match_seed();
            info!(room = %self.name, match_seed, "room full, match ready");
            for peer in &self.peers {
                deliveries.push((peer.seat, ServerFrame::MatchReady { match_seed }));
            }
        }

        Ok((seat, deliveries))
    }

    /// The shared seed both peers draw their match randomness from.
    fn match_seed(&self) -> u64 {
        let mut peer_ids: Vec<[u8; 16]> = self.peers.iter().map(|p| *p.peer_id.as_bytes()).collect();
        peer_ids.sort_unstable();
        let nonce = self.created_at.timestamp_millis() as u64;
        derive_match_seed(self.id.as_bytes(), &peer_ids, nonce)
    }

    /// Validate and route one in-room frame.
    ///
    /// Returns the fan-out in delivery order. A rejected frame routes
    /// nowhere; the caller reports the error to the sender alone.
    pub fn route(
        &mut self,
        from: Seat,
        frame: ClientFrame,
        now: DateTime<Utc>,
    ) -> Result<Vec<(Seat, ServerFrame)>, RoomError> {
        if self.state != RoomLifecycle::InMatch {
            return Err(RoomError::MatchNotInProgress);
        }

        match frame {
            ClientFrame::Join { .. } => Err(RoomError::AlreadyInRoom),

            ClientFrame::SetPlayerProp { seat, prop } => {
                if seat != from && from != Self::authority_seat() {
                    warn!(?from, ?seat, "rejected write to another peer's record");
                    return Err(RoomError::WrongSeat);
                }
                Ok(self.fan_to_all(ServerFrame::PlayerProperty { seat, prop }))
            }

            ClientFrame::SetRoomProp { prop } => {
                if from != Self::authority_seat() {
                    warn!(?from, "rejected room write from non-authority");
                    return Err(RoomError::NotAuthority);
                }
                Ok(self.fan_to_all(ServerFrame::RoomProperty { prop }))
            }

            ClientFrame::BeginTurn => {
                if from != Self::authority_seat() {
                    warn!(?from, "rejected turn open from non-authority");
                    return Err(RoomError::NotAuthority);
                }
                self.next_turn_id += 1;
                let turn_id = self.next_turn_id;
                self.open_turn = Some(OpenTurn {
                    turn_id,
                    expires_at: now + Duration::seconds(self.config.turn_timeout_secs),
                });
                Ok(self.fan_to_all(ServerFrame::TurnBegan { turn_id }))
            }

            ClientFrame::SendMove { turn_id, finished } => {
                if !finished {
                    debug!(?from, "non-final move absorbed");
                    return Ok(Vec::new());
                }
                // A final move for an earlier turn must not disarm the
                // current turn's backstop.
                if matches!(&self.open_turn, Some(open) if open.turn_id == turn_id) {
                    self.open_turn = None;
                }
                Ok(self.fan_to_all(ServerFrame::PlayerFinished { seat: from, turn_id }))
            }

            ClientFrame::Broadcast { signal, target } => {
                let frame = |signal| ServerFrame::Signal { from, signal };
                let deliveries = match target {
                    BroadcastTarget::All => self.fan_to_all(frame(signal)),
                    BroadcastTarget::Others => self
                        .peers
                        .iter()
                        .filter(|p| p.seat != from)
                        .map(|p| (p.seat, frame(signal.clone())))
                        .collect(),
                };
                Ok(deliveries)
            }

            // Handled by the relay before routing; absorbed if they get here.
            ClientFrame::Ping { .. } | ClientFrame::Leave => {
                debug!(?from, "connection-level frame reached the room router");
                Ok(Vec::new())
            }
        }
    }

    /// Run time-based housekeeping.
    ///
    /// Closes rooms that waited too long for an opponent and fires the
    /// backstop turn timer, each at most once.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<(Seat, ServerFrame)> {
        let mut deliveries = Vec::new();

        if self.state == RoomLifecycle::Waiting
            && now - self.created_at > Duration::seconds(self.config.waiting_timeout_secs)
        {
            info!(room = %self.name, "closing room, no opponent arrived");
            self.state = RoomLifecycle::Closed;
            for peer in &self.peers {
                deliveries.push((
                    peer.seat,
                    ServerFrame::Error(crate::transport::protocol::FrameError {
                        code: ErrorCode::RoomClosed,
                        message: "no opponent arrived".to_string(),
                    }),
                ));
            }
        }

        if self.state == RoomLifecycle::InMatch {
            if let Some(open) = &self.open_turn {
                if now > open.expires_at {
                    warn!(room = %self.name, turn_id = open.turn_id, "turn backstop elapsed");
                    let turn_id = open.turn_id;
                    self.open_turn = None;
                    deliveries.extend(self.fan_to_all(ServerFrame::TurnTimedOut { turn_id }));
                }
            }
        }

        deliveries
    }

    /// Unseat a peer and tell the other side.
    ///
    /// A two-peer match cannot outlive either peer, so the room closes.
    pub fn mark_left(&mut self, peer_id: PeerId) -> Vec<(Seat, ServerFrame)> {
        let Some(seat) = self.seat_of(peer_id) else {
            return Vec::new();
        };
        info!(room = %self.name, ?seat, "peer left");
        self.state = RoomLifecycle::Closed;
        self.peers
            .iter()
            .filter(|p| p.seat != seat)
            .map(|p| (p.seat, ServerFrame::PeerLeft { seat }))
            .collect()
    }

    fn fan_to_all(&self, frame: ServerFrame) -> Vec<(Seat, ServerFrame)> {
        self.peers
            .iter()
            .map(|p| (p.seat, frame.clone()))
            .collect()
    }

    /// Send a batch of frames to their seats.
    pub async fn deliver(&self, deliveries: Vec<(Seat, ServerFrame)>) {
        for (seat, frame) in deliveries {
            if let Some(peer) = self.peers.iter().find(|p| p.seat == seat) {
                if peer.sender.send(frame).await.is_err() {
                    debug!(?seat, "dropping frame for a gone peer");
                }
            }
        }
    }
}

/// Room errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RoomError {
    /// Room already has two peers.
    #[error("Room is full")]
    RoomFull,

    /// Peer already seated in a room.
    #[error("Already in a room")]
    AlreadyInRoom,

    /// Frame arrived before the match was ready.
    #[error("Match not in progress")]
    MatchNotInProgress,

    /// Non-authority peer attempted an authority operation.
    #[error("Not the room authority")]
    NotAuthority,

    /// Write to another peer's record.
    #[error("Wrong seat for this write")]
    WrongSeat,

    /// Room is closed.
    #[error("Room is closed")]
    Closed,

    /// Peer is not in any room.
    #[error("Not in a room")]
    NotInRoom,
}

impl RoomError {
    /// The wire code reported to the offending sender.
    pub fn code(&self) -> ErrorCode {
        match self {
            RoomError::RoomFull => ErrorCode::RoomFull,
            RoomError::AlreadyInRoom => ErrorCode::AlreadyInRoom,
            RoomError::MatchNotInProgress => ErrorCode::NotInRoom,
            RoomError::NotAuthority => ErrorCode::NotAuthority,
            RoomError::WrongSeat => ErrorCode::WrongSeat,
            RoomError::Closed => ErrorCode::RoomClosed,
            RoomError::NotInRoom => ErrorCode::NotInRoom,
        }
    }
}

// =============================================================================
// ROOM MANAGER
// =============================================================================

/// Manages all rooms on a relay.
pub struct RoomManager {
    config: RoomConfig,
    rooms: RwLock<BTreeMap<RoomId, Arc<RwLock<RoomSession>>>>,
    names: RwLock<BTreeMap<String, RoomId>>,
    peer_rooms: RwLock<BTreeMap<PeerId, RoomId>>,
}

impl RoomManager {
    /// Create a manager with the given per-room configuration.
    pub fn new(config: RoomConfig) -> Self {
        Self {
            config,
            rooms: RwLock::new(BTreeMap::new()),
            names: RwLock::new(BTreeMap::new()),
            peer_rooms: RwLock::new(BTreeMap::new()),
        }
    }

    /// Seat a peer: into the named room, or into any open room, or into
    /// a freshly created one.
    pub async fn join(
        &self,
        room_name: Option<String>,
        peer_id: PeerId,
        sender: mpsc::Sender<ServerFrame>,
    ) -> Result<(Arc<RwLock<RoomSession>>, Seat), RoomError> {
        if self.peer_rooms.read().await.contains_key(&peer_id) {
            return Err(RoomError::AlreadyInRoom);
        }

        let room = match room_name {
            Some(name) => self.named_room(name).await?,
            None => self.any_open_room().await,
        };

        let (room_id, seat, deliveries) = {
            let mut session = room.write().await;
            let (seat, deliveries) = session.join(peer_id, sender)?;
            (session.id, seat, deliveries)
        };

        // Registry and session locks are never held together; the
        // ordering here is what keeps every path deadlock free.
        self.peer_rooms.write().await.insert(peer_id, room_id);
        room.read().await.deliver(deliveries).await;

        Ok((room, seat))
    }

    /// Fetch or create the room with this name.
    async fn named_room(&self, name: String) -> Result<Arc<RwLock<RoomSession>>, RoomError> {
        let existing = self.names.read().await.get(&name).copied();
        if let Some(id) = existing {
            let room = self.rooms.read().await.get(&id).cloned();
            if let Some(room) = room {
                return if room.read().await.is_open() {
                    Ok(room)
                } else {
                    Err(RoomError::RoomFull)
                };
            }
        }
        Ok(self.create_room(name).await)
    }

    /// Find any room waiting for an opponent, or open a new one.
    async fn any_open_room(&self) -> Arc<RwLock<RoomSession>> {
        {
            let rooms = self.rooms.read().await;
            for room in rooms.values() {
                if room.read().await.is_open() {
                    return room.clone();
                }
            }
        }
        let id = RoomId::new_random();
        let name = format!("room-{}", &hex::encode(id.as_bytes())[..8]);
        self.create_room_with_id(id, name).await
    }

    async fn create_room(&self, name: String) -> Arc<RwLock<RoomSession>> {
        self.create_room_with_id(RoomId::new_random(), name).await
    }

    async fn create_room_with_id(&self, id: RoomId, name: String) -> Arc<RwLock<RoomSession>> {
        let session = RoomSession::new(id, name.clone(), self.config.clone(), Utc::now());
        let room = Arc::new(RwLock::new(session));
        self.rooms.write().await.insert(id, room.clone());
        self.names.write().await.insert(name, id);
        debug!(room_id = %id, "room created");
        room
    }

    /// The room a peer is seated in.
    pub async fn room_of_peer(&self, peer_id: PeerId) -> Option<Arc<RwLock<RoomSession>>> {
        let room_id = self.peer_rooms.read().await.get(&peer_id).copied()?;
        self.rooms.read().await.get(&room_id).cloned()
    }

    /// Unseat a peer, notify its opponent, and drop the dead room.
    pub async fn leave(&self, peer_id: PeerId) {
        let Some(room) = self.room_of_peer(peer_id).await else {
            return;
        };
        let deliveries = {
            let mut session = room.write().await;
            session.mark_left(peer_id)
        };
        room.read().await.deliver(deliveries).await;
        self.peer_rooms.write().await.remove(&peer_id);
        self.cleanup().await;
    }

    /// Run the sweep over every room and drop the closed ones.
    pub async fn sweep(&self, now: DateTime<Utc>) {
        let rooms: Vec<_> = self.rooms.read().await.values().cloned().collect();
        for room in rooms {
            let deliveries = {
                let mut session = room.write().await;
                session.sweep(now)
            };
            if !deliveries.is_empty() {
                let session = room.read().await;
                session.deliver(deliveries).await;
            }
        }
        self.cleanup().await;
    }

    /// Remove closed rooms from the registries.
    ///
    /// Two phases: find the closed rooms holding only read locks, then
    /// unregister without touching any session lock.
    async fn cleanup(&self) {
        let mut closed = Vec::new();
        {
            let rooms = self.rooms.read().await;
            for (id, room) in rooms.iter() {
                let session = room.read().await;
                if session.lifecycle() == RoomLifecycle::Closed {
                    let peer_ids: Vec<PeerId> =
                        session.peers.iter().map(|p| p.peer_id).collect();
                    closed.push((*id, session.name.clone(), peer_ids));
                }
            }
        }
        if closed.is_empty() {
            return;
        }
        let mut rooms = self.rooms.write().await;
        let mut names = self.names.write().await;
        let mut peer_rooms = self.peer_rooms.write().await;
        for (id, name, peer_ids) in closed {
            rooms.remove(&id);
            names.remove(&name);
            for peer_id in peer_ids {
                peer_rooms.remove(&peer_id);
            }
        }
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
