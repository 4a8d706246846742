//! Battle Logic Module
//!
//! All match rules. 100% deterministic: the driver consumes commands,
//! transport events, and second ticks, and produces effects, so two
//! peers fed the same inputs stay byte-identical.
//!
//! ## Module Structure
//!
//! - `card`: Card types and the triangle judgement
//! - `score`: Round awards and the match outcome
//! - `player`: Seats and the replicated per-player record
//! - `room`: Round, phase, and the replicated room record
//! - `turn`: Initiative, countdown, and forced picks
//! - `retry`: Rematch vote rules
//! - `events`: Match signals and presentation notifications
//! - `driver`: The per-peer state machine tying it all together

pub mod card;
pub mod score;
pub mod player;
pub mod room;
pub mod turn;
pub mod retry;
pub mod events;
pub mod driver;

// Re-export key types
pub use card::{judge, CardType, Judgement};
pub use driver::{
    BattleDriver, BroadcastTarget, Effect, MatchConfig, PeerEvent, PlayerCommand, Role,
};
pub use events::{Notification, Signal};
pub use player::{PerSeat, PlayerProp, PlayerState, Seat};
pub use room::{BattlePhase, RoomProp, RoomState};
pub use score::{match_outcome, ScoreKeeper};
