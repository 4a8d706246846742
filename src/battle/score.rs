//! Point Awards
//!
//! Converts round judgements into points. Only the authority applies
//! awards, once per round, after both cards are down and judged.

use serde::{Serialize, Deserialize};

use super::card::Judgement;

/// Computes point awards for round outcomes.
///
/// Constructed once per match from the match configuration. A round win
/// earns `base_points`, multiplied by `skill_multiplier` when the winner
/// had activated the special skill that round. Draws and losses earn
/// nothing.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ScoreKeeper {
    base_points: u32,
    skill_multiplier: u32,
}

impl ScoreKeeper {
    /// Create a keeper with the given award parameters.
    pub fn new(base_points: u32, skill_multiplier: u32) -> Self {
        Self { base_points, skill_multiplier }
    }

    /// Points earned for `judgement`, given whether the player spent the
    /// special skill this round.
    pub fn award(&self, judgement: Judgement, used_skill: bool) -> u32 {
        match judgement {
            Judgement::Win if used_skill => self.base_points * self.skill_multiplier,
            Judgement::Win => self.base_points,
            Judgement::Lose | Judgement::Draw => 0,
        }
    }
}

/// Decide the match from final totals, seen from the first argument's side.
///
/// More points wins; equal totals draw the match.
pub fn match_outcome(own_points: u32, other_points: u32) -> Judgement {
    match own_points.cmp(&other_points) {
        std::cmp::Ordering::Greater => Judgement::Win,
        std::cmp::Ordering::Less => Judgement::Lose,
        std::cmp::Ordering::Equal => Judgement::Draw,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_win_awards_base_points() {
        let keeper = ScoreKeeper::new(1, 2);
        assert_eq!(keeper.award(Judgement::Win, false), 1);
    }

    #[test]
    fn test_skill_doubles_a_win() {
        let keeper = ScoreKeeper::new(1, 2);
        assert_eq!(keeper.award(Judgement::Win, true), 2);

        let bigger = ScoreKeeper::new(5, 3);
        assert_eq!(bigger.award(Judgement::Win, true), 15);
    }

    #[test]
    fn test_draw_and_loss_award_nothing() {
        let keeper = ScoreKeeper::new(1, 2);
        for used_skill in [false, true] {
            assert_eq!(keeper.award(Judgement::Draw, used_skill), 0);
            assert_eq!(keeper.award(Judgement::Lose, used_skill), 0);
        }
    }

    #[test]
    fn test_match_outcome() {
        assert_eq!(match_outcome(2, 1), Judgement::Win);
        assert_eq!(match_outcome(0, 3), Judgement::Lose);
        assert_eq!(match_outcome(2, 2), Judgement::Draw);
        assert_eq!(match_outcome(0, 0), Judgement::Draw);
    }
}
