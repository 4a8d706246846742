//! Card Types and Judgement
//!
//! The pure rules of the duel: three card types locked in a cycle.
//! Everything here is total and deterministic; no state, no I/O.

use serde::{Serialize, Deserialize};

/// The three card types.
///
/// Dominance is cyclic: Princess beats Brave, Brave beats Devil,
/// Devil beats Princess. Identical cards draw. There is no strongest
/// card; every type beats exactly one other and loses to exactly one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CardType {
    Princess = 0,
    Brave = 1,
    Devil = 2,
}

impl CardType {
    /// Every card type, in declaration order. Also the full hand a
    /// player chooses from each round.
    pub const ALL: [CardType; 3] = [CardType::Princess, CardType::Brave, CardType::Devil];

    /// The type this card defeats.
    #[inline]
    pub fn beats(self) -> CardType {
        match self {
            CardType::Princess => CardType::Brave,
            CardType::Brave => CardType::Devil,
            CardType::Devil => CardType::Princess,
        }
    }

    /// The type this card loses to.
    #[inline]
    pub fn loses_to(self) -> CardType {
        match self {
            CardType::Princess => CardType::Devil,
            CardType::Brave => CardType::Princess,
            CardType::Devil => CardType::Brave,
        }
    }
}

/// Round outcome from one player's perspective.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Judgement {
    Win = 0,
    Lose = 1,
    Draw = 2,
}

impl Judgement {
    /// The same outcome seen from the opposite seat.
    #[inline]
    pub fn invert(self) -> Judgement {
        match self {
            Judgement::Win => Judgement::Lose,
            Judgement::Lose => Judgement::Win,
            Judgement::Draw => Judgement::Draw,
        }
    }
}

/// Judge two committed cards from the perspective of `own`.
///
/// Pure and total: every pair of inputs has exactly one outcome, and
/// `judge(a, b)` is always the inverse of `judge(b, a)`.
#[inline]
pub fn judge(own: CardType, other: CardType) -> Judgement {
    if own == other {
        Judgement::Draw
    } else if own.beats() == other {
        Judgement::Win
    } else {
        Judgement::Lose
    }
}

// =============================================================================
// TESTS
// =============================================================================
