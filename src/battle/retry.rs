//! Rematch Voting
//!
//! After a match ends, each player may vote once for a rematch. The
//! authority watches both votes and, when they agree, clears them and
//! issues a full match reset. The vote flags live in `PlayerState`; this
//! module holds the rules applied to them.

use super::player::{PerSeat, PlayerState};

/// Whether a retry request from this player is accepted right now.
///
/// Requests are only valid once the match is over, and only once per
/// player; anything else is a silent no-op at the driver.
pub fn request_is_valid(match_over: bool, player: &PlayerState) -> bool {
    match_over && !player.is_requesting_retry
}

/// Whether both players have voted for a rematch.
pub fn rematch_agreed(players: &PerSeat<PlayerState>) -> bool {
    players.iter().all(|(_, player)| player.is_requesting_retry)
}

// =============================================================================
// TESTS
// =============================================================================
