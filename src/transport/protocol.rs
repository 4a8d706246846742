//! Protocol Frames
//!
//! Wire format between peers and the relay over WebSocket.
//! All frames are serialized as JSON for debugging ease,
//! with optional binary (bincode) for flat payloads.

use serde::{Deserialize, Serialize};

use crate::battle::driver::{BroadcastTarget, Effect, PeerEvent};
use crate::battle::events::Signal;
use crate::battle::player::{PlayerProp, Seat};
use crate::battle::room::RoomProp;
use crate::transport::RoomId;

// =============================================================================
// PEER -> RELAY FRAMES
// =============================================================================

/// Frames sent from a peer to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Join a room by name, or let the relay pair us into any open room.
    Join {
        /// Named room for private matches; `None` for quick pairing.
        room: Option<String>,
    },

    /// Replicate one field of a player record.
    SetPlayerProp {
        /// Whose record. Non-authority senders may only write their own.
        seat: Seat,
        /// The field update.
        prop: PlayerProp,
    },

    /// Replicate one field of the room record. Authority only.
    SetRoomProp {
        /// The field update.
        prop: RoomProp,
    },

    /// Open a turn on the turn channel. Authority only.
    BeginTurn,

    /// Send a move on the turn channel.
    SendMove {
        /// The turn this move belongs to.
        turn_id: u32,
        /// Whether this is the sender's final move for the turn.
        finished: bool,
    },

    /// Fan a match signal out to the room.
    Broadcast {
        /// The payload.
        signal: Signal,
        /// Who receives it.
        target: BroadcastTarget,
    },

    /// Ping for latency measurement.
    Ping {
        /// Sender timestamp, echoed back.
        timestamp: u64,
    },

    /// Leave the room.
    Leave,
}

// =============================================================================
// RELAY -> PEER FRAMES
// =============================================================================

/// Frames sent from the relay to a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Join succeeded; here is your place in the room.
    Joined {
        /// Room identifier.
        room_id: RoomId,
        /// Room name (assigned if the join was unnamed).
        room: String,
        /// The seat this connection occupies.
        seat: Seat,
        /// Whether this connection is the room authority.
        authority: bool,
    },

    /// Both peers are present; the match may start.
    MatchReady {
        /// Shared seed for match randomness.
        match_seed: u64,
    },

    /// A player record field changed.
    PlayerProperty {
        /// Whose record.
        seat: Seat,
        /// The field update.
        prop: PlayerProp,
    },

    /// A room record field changed.
    RoomProperty {
        /// The field update.
        prop: RoomProp,
    },

    /// A turn opened on the turn channel.
    TurnBegan {
        /// Relay-assigned turn number.
        turn_id: u32,
    },

    /// A player sent its final move for a turn.
    PlayerFinished {
        /// Who finished.
        seat: Seat,
        /// The turn the final move belongs to.
        turn_id: u32,
    },

    /// The relay's backstop timer for the current turn elapsed.
    TurnTimedOut {
        /// Which turn timed out.
        turn_id: u32,
    },

    /// A match signal fanned out to this peer.
    Signal {
        /// The sending seat.
        from: Seat,
        /// The payload.
        signal: Signal,
    },

    /// The other peer left the room.
    PeerLeft {
        /// The seat that emptied.
        seat: Seat,
    },

    /// Pong response.
    Pong {
        /// Timestamp from the ping.
        timestamp: u64,
        /// Relay wall-clock millis.
        server_time: u64,
    },

    /// A frame was rejected.
    Error(FrameError),

    /// The relay is shutting down.
    Shutdown {
        /// Why.
        reason: String,
    },
}

/// Frame rejection details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Frame could not be parsed.
    InvalidFrame,
    /// Sender has not joined a room.
    NotInRoom,
    /// Room already has two peers.
    RoomFull,
    /// Sender already joined a room.
    AlreadyInRoom,
    /// Authority-only operation from a non-authority peer.
    NotAuthority,
    /// Write to another peer's record.
    WrongSeat,
    /// Room is closed.
    RoomClosed,
    /// Internal error.
    InternalError,
}

// =============================================================================
// DRIVER MAPPINGS
// =============================================================================

impl ServerFrame {
    /// Map a frame to the driver event it carries, if any.
    ///
    /// Handshake and housekeeping frames (`Joined`, `Pong`, `Error`,
    /// `Shutdown`) are handled by the shell and map to `None`.
    pub fn to_peer_event(&self) -> Option<PeerEvent> {
        match self {
            ServerFrame::MatchReady { .. } => Some(PeerEvent::MatchReady),
            ServerFrame::PlayerProperty { seat, prop } => {
                Some(PeerEvent::PlayerProperty { seat: *seat, prop: *prop })
            }
            ServerFrame::RoomProperty { prop } => {
                Some(PeerEvent::RoomProperty { prop: *prop })
            }
            ServerFrame::TurnBegan { turn_id } => {
                Some(PeerEvent::TurnBegan { turn_id: *turn_id })
            }
            ServerFrame::PlayerFinished { seat, turn_id } => {
                Some(PeerEvent::PlayerFinished { seat: *seat, turn_id: *turn_id })
            }
            ServerFrame::TurnTimedOut { turn_id } => {
                Some(PeerEvent::TurnTimedOut { turn_id: *turn_id })
            }
            ServerFrame::Signal { from, signal } => Some(PeerEvent::Signal {
                from: *from,
                signal: signal.clone(),
            }),
            ServerFrame::PeerLeft { .. } => Some(PeerEvent::PeerLeft),
            ServerFrame::Joined { .. }
            | ServerFrame::Pong { .. }
            | ServerFrame::Error(_)
            | ServerFrame::Shutdown { .. } => None,
        }
    }
}

/// Map a driver effect to the frame that carries it, if any.
///
/// `Notify` effects are presentation-local and map to `None`.
pub fn frame_for_effect(effect: &Effect) -> Option<ClientFrame> {
    match effect {
        Effect::SetPlayerProp { seat, prop } => {
            Some(ClientFrame::SetPlayerProp { seat: *seat, prop: *prop })
        }
        Effect::SetRoomProp { prop } => Some(ClientFrame::SetRoomProp { prop: *prop }),
        Effect::BeginTurn => Some(ClientFrame::BeginTurn),
        Effect::SendMove { turn_id, finished } => {
            Some(ClientFrame::SendMove { turn_id: *turn_id, finished: *finished })
        }
        Effect::Broadcast { signal, target } => Some(ClientFrame::Broadcast {
            signal: signal.clone(),
            target: *target,
        }),
        Effect::Notify(_) => None,
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientFrame {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

impl ServerFrame {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}
