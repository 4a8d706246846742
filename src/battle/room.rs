//! Room State
//!
//! The shared, authority-owned side of a match: round number, phase, and
//! the skill-direction flag. Followers hold a mirror updated purely by
//! replicated `RoomProp` applications.

use serde::{Serialize, Deserialize};

use crate::core::hash::StateHasher;

/// Shared round phase.
///
/// Only the authority advances this. `Selected` is also observed locally
/// by a peer the moment it commits its own card, before the shared value
/// catches up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum BattlePhase {
    /// Pre-match and post-reset.
    #[default]
    None = 0,
    /// Both players may commit a card.
    Selection = 1,
    /// At least one card is down; waiting for the other.
    Selected = 2,
    /// Authority is judging the two cards.
    Judgement = 3,
    /// Round outcome visible; dwell before the next round or match end.
    Result = 4,
}

/// The first round of every match.
pub const INITIAL_ROUND: u32 = 1;

/// Shared room record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomState {
    /// Current round, counted from 1.
    pub round: u32,
    /// Shared phase, authority-written.
    pub phase: BattlePhase,
    /// True while a skill-activation presentation runs; every peer's
    /// countdown is suspended for the duration.
    pub is_directing_skill: bool,
}

impl Default for RoomState {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomState {
    /// Room state at match start.
    pub fn new() -> Self {
        Self {
            round: INITIAL_ROUND,
            phase: BattlePhase::None,
            is_directing_skill: false,
        }
    }

    /// Apply one replicated room update. Returns whether anything changed.
    pub fn apply(&mut self, prop: RoomProp) -> bool {
        match prop {
            RoomProp::Round(v) => replace(&mut self.round, v),
            RoomProp::Phase(v) => replace(&mut self.phase, v),
            RoomProp::IsDirectingSkill(v) => replace(&mut self.is_directing_skill, v),
        }
    }

    /// Feed the shared fields into a state digest.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u32(self.round);
        hasher.update_u8(self.phase as u8);
        hasher.update_bool(self.is_directing_skill);
    }
}

/// One replicated room field update. Authority-issued only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomProp {
    Round(u32),
    Phase(BattlePhase),
    IsDirectingSkill(bool),
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}

// =============================================================================
// TESTS
// =============================================================================
