//! Turn Coordination
//!
//! Initiative and the selection countdown. Initiative starts on a coin
//! flip and flips at turn end unless the finishing player had already
//! committed a card. The countdown is plain timer state advanced by the
//! driver's once-per-second tick; expiry forces a uniformly random card
//! onto the initiative holder.

use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::core::rng::DeterministicRng;
use super::card::CardType;
use super::player::{PlayerState, Seat};
use super::room::BattlePhase;

/// Result of advancing the countdown by one second.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountdownStep {
    /// Timer not running; nothing happened.
    Idle,
    /// One second elapsed; this many remain.
    Ticked(u32),
    /// The timer just hit zero.
    Expired,
}

/// Explicit countdown state.
///
/// Suspension keeps `remaining_secs` intact; only a restart refills it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    remaining_secs: u32,
    running: bool,
}

impl Countdown {
    /// A stopped, empty timer.
    pub fn stopped() -> Self {
        Self { remaining_secs: 0, running: false }
    }

    /// Refill to `secs` and start running.
    pub fn restart(&mut self, secs: u32) {
        self.remaining_secs = secs;
        self.running = secs > 0;
    }

    /// Suspend, preserving the remaining time.
    pub fn pause(&mut self) {
        self.running = false;
    }

    /// Stop and clear.
    pub fn stop(&mut self) {
        self.remaining_secs = 0;
        self.running = false;
    }

    /// Seconds left.
    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    /// Whether the timer is counting.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Advance one second.
    pub fn tick(&mut self) -> CountdownStep {
        if !self.running {
            return CountdownStep::Idle;
        }
        self.remaining_secs -= 1;
        if self.remaining_secs == 0 {
            self.running = false;
            CountdownStep::Expired
        } else {
            CountdownStep::Ticked(self.remaining_secs)
        }
    }
}

/// Turn coordinator for one peer.
///
/// Owns this peer's view of the countdown and the pure initiative rules.
/// Which seat the rules get applied to is the driver's business.
#[derive(Clone, Debug)]
pub struct TurnCoordinator {
    countdown: Countdown,
    countdown_secs: u32,
}

impl TurnCoordinator {
    /// Create a coordinator with the configured selection countdown.
    pub fn new(countdown_secs: u32) -> Self {
        Self {
            countdown: Countdown::stopped(),
            countdown_secs,
        }
    }

    /// Coin-flip the opening initiative holder. Authority only; decided
    /// once at match start and once per rematch.
    pub fn decide_first_holder(&self, rng: &mut DeterministicRng) -> Seat {
        let holder = if rng.next_bool() { Seat::Host } else { Seat::Guest };
        debug!(?holder, "coin flip decided opening initiative");
        holder
    }

    /// The flip rule: initiative moves to the other player exactly when
    /// the finishing player had not placed a field card.
    pub fn should_flip(finished_player_placed: bool) -> bool {
        !finished_player_placed
    }

    /// Whether a countdown expiry forces a pick for `player`.
    ///
    /// Only the initiative holder is forced, only during selection, and
    /// never once its card is already down.
    pub fn timeout_forces_pick(phase: BattlePhase, player: &PlayerState) -> bool {
        phase == BattlePhase::Selection
            && player.is_my_turn
            && !player.is_field_card_placed
    }

    /// Choose a card uniformly at random from the player's remaining hand.
    pub fn pick_random_card(
        &self,
        rng: &mut DeterministicRng,
        player: &PlayerState,
    ) -> Option<CardType> {
        let hand = remaining_hand(player);
        rng.choose(&hand).copied()
    }

    /// Refill the countdown to its full duration and start it.
    pub fn restart_countdown(&mut self) {
        self.countdown.restart(self.countdown_secs);
    }

    /// Suspend the countdown, keeping the remaining time.
    pub fn pause_countdown(&mut self) {
        self.countdown.pause();
    }

    /// Stop and clear the countdown.
    pub fn stop_countdown(&mut self) {
        self.countdown.stop();
    }

    /// Advance the countdown by one second.
    pub fn tick_countdown(&mut self) -> CountdownStep {
        self.countdown.tick()
    }

    /// Seconds left on the countdown.
    pub fn countdown_remaining(&self) -> u32 {
        self.countdown.remaining_secs()
    }

    /// Whether the countdown is currently running.
    pub fn countdown_running(&self) -> bool {
        self.countdown.is_running()
    }

    /// The configured full countdown duration.
    pub fn countdown_secs(&self) -> u32 {
        self.countdown_secs
    }
}

/// The cards a player can still commit this round.
pub fn remaining_hand(player: &PlayerState) -> Vec<CardType> {
    CardType::ALL
        .into_iter()
        .filter(|&card| player.selected_card != Some(card))
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
