//! Match Signals and Presentation Notifications
//!
//! Two one-way event vocabularies: `Signal` travels between peers over
//! the broadcast channel, `Notification` travels from the driver to
//! whatever presentation sits on top. Both are pure data; nothing here
//! renders, schedules, or mutates.

use serde::{Serialize, Deserialize};

use crate::core::hash::StateHash;
use super::card::{CardType, Judgement};
use super::player::{PerSeat, Seat};
use super::room::BattlePhase;

/// Authority-issued broadcast signals.
///
/// Sent over the ordered broadcast channel, so a signal is always seen
/// after every property update the authority issued before it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    /// A round is starting. `fresh_match` marks round 1 of a new match
    /// (first start or rematch), which carries a fresh coin flip.
    RoundStart { round: u32, fresh_match: bool },
    /// Refill the selection countdown to its full duration.
    CountdownReset,
    /// Both cards are judged; reveals the cards and the awards.
    ///
    /// `digest` is the authority's state digest at announcement time;
    /// the receiving peer recomputes and compares to detect drift.
    RoundResult {
        cards: PerSeat<CardType>,
        winner: Option<Seat>,
        awards: PerSeat<u32>,
        digest: StateHash,
    },
    /// All rounds played; totals decide the match.
    MatchEnd,
}

/// Driver-to-presentation notifications.
///
/// Everything a UI needs to mirror the match, and nothing it does not:
/// a remote placement never carries the card value; true cards only
/// appear in `RoundJudged`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// The shared phase advanced.
    PhaseChanged { phase: BattlePhase },
    /// A round is beginning.
    RoundStarted { round: u32, max_rounds: u32 },
    /// Initiative moved (or was first assigned).
    TurnChanged { holder: Seat },
    /// One second of selection countdown elapsed.
    CountdownTick { remaining_secs: u32 },
    /// A card landed on the field. `card` is present only for the local
    /// seat; `auto` marks a countdown-forced pick.
    CardPlaced { seat: Seat, card: Option<CardType>, auto: bool },
    /// The one-per-match skill fired.
    SkillActivated { seat: Seat },
    /// Round outcome from the local seat's perspective.
    RoundJudged {
        own_card: CardType,
        opponent_card: CardType,
        judgement: Judgement,
        points_gained: u32,
        own_points: u32,
        opponent_points: u32,
    },
    /// Match outcome from the local seat's perspective.
    MatchEnded {
        outcome: Judgement,
        own_points: u32,
        opponent_points: u32,
    },
    /// Both players agreed to a rematch; a new match is starting.
    MatchRestarted,
    /// The other peer is gone; the match is halted.
    OpponentLeft,
}

// =============================================================================
// TESTS
// =============================================================================
