//! # Triad Duel Server
//!
//! Synchronized two-player card battle: a WebSocket relay plus the
//! deterministic match engine every peer runs against it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    TRIAD DUEL SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── rng.rs      - Deterministic Xorshift128+ PRNG           │
//! │  └── hash.rs     - State digests for drift detection         │
//! │                                                              │
//! │  battle/         - Match logic (deterministic)               │
//! │  ├── card.rs     - Card types and the beats cycle            │
//! │  ├── player.rs   - Seats and replicated player records       │
//! │  ├── room.rs     - Shared room state and phases              │
//! │  ├── turn.rs     - Initiative and the selection countdown    │
//! │  ├── score.rs    - Round awards and match outcome            │
//! │  ├── retry.rs    - Rematch agreement                         │
//! │  ├── events.rs   - Peer signals and UI notifications         │
//! │  └── driver.rs   - Per-seat match driver                     │
//! │                                                              │
//! │  transport/      - Networking (non-deterministic)            │
//! │  ├── relay.rs    - WebSocket relay server                    │
//! │  ├── session.rs  - Room pairing and frame routing            │
//! │  ├── protocol.rs - Wire frames                               │
//! │  ├── client.rs   - Relay client                              │
//! │  ├── loopback.rs - In-process two-peer harness               │
//! │  └── peer.rs     - Driver shell over a link                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Convergence Guarantee
//!
//! The `core/` and `battle/` modules are **100% deterministic**:
//! - No system time dependencies; time arrives as counted ticks
//! - All randomness from seeded Xorshift128+, one lane per seat
//! - Replicated writes are last-write-wins and idempotent to re-apply
//!
//! Two peers fed the same ordered frames converge to **identical
//! state**, which the per-round digest exchange verifies.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod battle;
pub mod core;
pub mod transport;

// Re-export commonly used types
pub use crate::battle::card::{judge, CardType, Judgement};
pub use crate::battle::driver::{BattleDriver, MatchConfig, PlayerCommand, Role};
pub use crate::battle::events::Notification;
pub use crate::battle::player::{PerSeat, Seat};
pub use crate::core::hash::StateHash;
pub use crate::core::rng::DeterministicRng;
pub use crate::transport::{BattleRelay, MatchPeer, RelayConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Rounds per match
pub const MAX_ROUNDS: u32 = 3;

/// Selection countdown duration (seconds)
pub const COUNTDOWN_SECS: u32 = 10;
