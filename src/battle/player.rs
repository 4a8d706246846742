//! Player State
//!
//! The replicated per-player record. Each peer owns exactly one of these
//! and mirrors the opponent's; the mirror is only ever written by applying
//! replicated updates, never directly.

use serde::{Serialize, Deserialize};

use crate::core::hash::StateHasher;
use super::card::CardType;

/// The two seats of a duel.
///
/// `Host` is the first peer into the room and always the authority;
/// `Guest` joins second. Seats are stable for the lifetime of a room,
/// across retries included.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Seat {
    Host = 0,
    Guest = 1,
}

impl Seat {
    /// Both seats, host first.
    pub const BOTH: [Seat; 2] = [Seat::Host, Seat::Guest];

    /// The opposite seat.
    #[inline]
    pub fn other(self) -> Seat {
        match self {
            Seat::Host => Seat::Guest,
            Seat::Guest => Seat::Host,
        }
    }

    /// Stable index for arrays and RNG lanes.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// A pair of values, one per seat.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerSeat<T> {
    host: T,
    guest: T,
}

impl<T> PerSeat<T> {
    /// Build from explicit host and guest values.
    pub fn new(host: T, guest: T) -> Self {
        Self { host, guest }
    }

    /// Iterate seats with their values, host first.
    pub fn iter(&self) -> impl Iterator<Item = (Seat, &T)> {
        [(Seat::Host, &self.host), (Seat::Guest, &self.guest)].into_iter()
    }
}

impl<T> std::ops::Index<Seat> for PerSeat<T> {
    type Output = T;

    fn index(&self, seat: Seat) -> &T {
        match seat {
            Seat::Host => &self.host,
            Seat::Guest => &self.guest,
        }
    }
}

impl<T> std::ops::IndexMut<Seat> for PerSeat<T> {
    fn index_mut(&mut self, seat: Seat) -> &mut T {
        match seat {
            Seat::Host => &mut self.host,
            Seat::Guest => &mut self.guest,
        }
    }
}

/// One player's replicated battle record.
///
/// Writer discipline: the owning peer raises its own action flags, the
/// authority writes initiative, points, and round-boundary clears. The
/// driver is the only code that mutates these outside of `apply`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    /// True while this player holds initiative.
    pub is_my_turn: bool,
    /// Raised by the owner when its turn action is done; cleared when the
    /// final turn move goes out.
    pub is_my_turn_ended: bool,
    /// True once a card is committed this round.
    pub is_field_card_placed: bool,
    /// The committed card, if any.
    pub selected_card: Option<CardType>,
    /// True if the special skill was activated this round.
    pub is_using_skill_this_round: bool,
    /// False once the one-per-match skill has been spent.
    pub can_use_skill: bool,
    /// Total points earned this match.
    pub points: u32,
    /// Rematch vote after match end.
    pub is_requesting_retry: bool,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerState {
    /// A fresh player at match start: no flags, no points, skill unspent.
    pub fn new() -> Self {
        Self {
            is_my_turn: false,
            is_my_turn_ended: false,
            is_field_card_placed: false,
            selected_card: None,
            is_using_skill_this_round: false,
            can_use_skill: true,
            points: 0,
            is_requesting_retry: false,
        }
    }

    /// Apply one replicated field update. Returns whether anything changed,
    /// so redelivered updates are visible as the no-ops they are.
    pub fn apply(&mut self, prop: PlayerProp) -> bool {
        match prop {
            PlayerProp::IsMyTurn(v) => replace(&mut self.is_my_turn, v),
            PlayerProp::IsMyTurnEnded(v) => replace(&mut self.is_my_turn_ended, v),
            PlayerProp::IsFieldCardPlaced(v) => replace(&mut self.is_field_card_placed, v),
            PlayerProp::SelectedCard(v) => replace(&mut self.selected_card, v),
            PlayerProp::IsUsingSkillThisRound(v) => replace(&mut self.is_using_skill_this_round, v),
            PlayerProp::CanUseSkill(v) => replace(&mut self.can_use_skill, v),
            PlayerProp::Points(v) => replace(&mut self.points, v),
            PlayerProp::IsRequestingRetry(v) => replace(&mut self.is_requesting_retry, v),
        }
    }

    /// Feed the replicated fields into a state digest.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_bool(self.is_my_turn);
        hasher.update_bool(self.is_field_card_placed);
        hasher.update_u8(self.selected_card.map(|c| c as u8 + 1).unwrap_or(0));
        hasher.update_bool(self.is_using_skill_this_round);
        hasher.update_bool(self.can_use_skill);
        hasher.update_u32(self.points);
    }
}

/// One replicated player field update.
///
/// The unit of player-scope replication: a peer sets a field, the relay
/// fans the update out, every peer applies it through `PlayerState::apply`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerProp {
    IsMyTurn(bool),
    IsMyTurnEnded(bool),
    IsFieldCardPlaced(bool),
    SelectedCard(Option<CardType>),
    IsUsingSkillThisRound(bool),
    CanUseSkill(bool),
    Points(u32),
    IsRequestingRetry(bool),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seats_are_opposed() {
        assert_eq!(Seat::Host.other(), Seat::Guest);
        assert_eq!(Seat::Guest.other(), Seat::Host);
        assert_eq!(Seat::Host.other().other(), Seat::Host);
    }

    #[test]
    fn test_per_seat_indexing() {
        let mut pair = PerSeat::new(1u32, 2u32);
        assert_eq!(pair[Seat::Host], 1);
        assert_eq!(pair[Seat::Guest], 2);

        pair[Seat::Guest] = 7;
        assert_eq!(pair[Seat::Guest], 7);

        let seats: Vec<Seat> = pair.iter().map(|(s, _)| s).collect();
        assert_eq!(seats, vec![Seat::Host, Seat::Guest]);
    }

    #[test]
    fn test_new_player_invariants() {
        let player = PlayerState::new();
        assert!(player.can_use_skill);
        assert!(!player.is_my_turn);
        assert!(!player.is_field_card_placed);
        assert_eq!(player.selected_card, None);
        assert_eq!(player.points, 0);
    }

    #[test]
    fn test_apply_reports_change() {
        let mut player = PlayerState::new();

        assert!(player.apply(PlayerProp::IsFieldCardPlaced(true)));
        // Redelivery of the same update is a no-op
        assert!(!player.apply(PlayerProp::IsFieldCardPlaced(true)));

        assert!(player.apply(PlayerProp::SelectedCard(Some(CardType::Brave))));
        assert!(!player.apply(PlayerProp::SelectedCard(Some(CardType::Brave))));
        assert!(player.apply(PlayerProp::SelectedCard(None)));
    }

    #[test]
    fn test_hash_distinguishes_selected_cards() {
        let digest = |player: &PlayerState| {
            let mut hasher = StateHasher::for_battle_state();
            player.hash_into(&mut hasher);
            hasher.finalize()
        };

        let mut a = PlayerState::new();
        let b = a.clone();
        assert_eq!(digest(&a), digest(&b));

        a.selected_card = Some(CardType::Princess);
        assert_ne!(digest(&a), digest(&b));
    }
}
