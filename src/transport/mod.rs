//! Transport Layer
//!
//! WebSocket relay and peer plumbing for two-player matches.
//! This layer is **non-deterministic** - all match logic runs through
//! `battle/`, which sees only ordered frames and one-second ticks.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::battle::player::Seat;

pub mod client;
pub mod loopback;
pub mod peer;
pub mod protocol;
pub mod relay;
pub mod session;

pub use client::{ClientError, RelayClient};
pub use loopback::{loopback_pair, LoopbackLink};
pub use peer::{MatchPeer, PeerHandle};
pub use protocol::{
    frame_for_effect, ClientFrame, ErrorCode, FrameError, ServerFrame,
};
pub use relay::{BattleRelay, RelayConfig, RelayError};
pub use session::{RoomConfig, RoomError, RoomLifecycle, RoomManager, RoomSession};

/// Unique peer identifier (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Default)]
pub struct PeerId(pub [u8; 16]);

impl PeerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create a fresh random identifier.
    pub fn new_random() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", uuid::Uuid::from_bytes(self.0))
    }
}

/// Unique room identifier (UUID as bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Default)]
pub struct RoomId(pub [u8; 16]);

impl RoomId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create a fresh random identifier.
    pub fn new_random() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", uuid::Uuid::from_bytes(self.0))
    }
}

/// Everything a peer needs to start its local match driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchHandshake {
    /// Room identifier.
    pub room_id: RoomId,
    /// Room name.
    pub room: String,
    /// The seat this peer occupies.
    pub seat: Seat,
    /// Whether this peer owns shared room state.
    pub authority: bool,
    /// Shared seed for match randomness.
    pub match_seed: u64,
}
