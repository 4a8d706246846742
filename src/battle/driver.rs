//! Battle Driver
//!
//! The per-peer state machine that runs a match. Presentation commands,
//! transport events, and a once-per-second tick go in; property writes,
//! turn-channel operations, broadcasts, and presentation notifications
//! come out as [`Effect`]s for the shell to apply. The driver itself
//! never touches a socket or a clock, which keeps every transition
//! deterministic and directly testable.
//!
//! Consistency rules the driver lives by:
//!
//! - A peer's own writes apply locally first, then replicate; the echo
//!   that comes back through the store is absorbed as a no-op.
//! - Every handler is level-triggered and idempotent. Redelivered
//!   updates change nothing and emit nothing.
//! - Room state and cross-seat player fields are only written holding
//!   the [`Authority`] token, which the follower can never obtain.

use std::mem;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::hash::{compute_state_hash, StateHash};
use crate::core::rng::DeterministicRng;

use super::card::{judge, CardType, Judgement};
use super::events::{Notification, Signal};
use super::player::{PerSeat, PlayerProp, PlayerState, Seat};
use super::retry;
use super::room::{BattlePhase, RoomProp, RoomState, INITIAL_ROUND};
use super::score::{match_outcome, ScoreKeeper};
use super::turn::{CountdownStep, TurnCoordinator};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Match configuration.
///
/// All timings are whole seconds; the driver is advanced by a
/// once-per-second scheduler tick and nothing in a match needs finer
/// resolution.
#[derive(Clone, Copy, Debug)]
pub struct MatchConfig {
    /// Rounds per match.
    pub max_rounds: u32,
    /// Points for winning a round.
    pub base_points: u32,
    /// Award multiplier when the winner spent the skill that round.
    pub skill_multiplier: u32,
    /// Selection countdown duration.
    pub countdown_secs: u32,
    /// Delay between committing a card and ending the turn. Zero ends
    /// the turn in the same step.
    pub post_commit_delay_secs: u32,
    /// Dwell on the round result before advancing. Zero advances in the
    /// same step.
    pub result_dwell_secs: u32,
    /// How long the authority holds the skill-direction flag. Values
    /// below one second are stretched to one.
    pub skill_direction_secs: u32,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            max_rounds: crate::MAX_ROUNDS,
            base_points: 1,
            skill_multiplier: 2,
            countdown_secs: crate::COUNTDOWN_SECS,
            post_commit_delay_secs: 1,
            result_dwell_secs: 3,
            skill_direction_secs: 3,
        }
    }
}

/// Which side of the authority split this peer is on.
///
/// Assigned by the transport when the room forms (first peer in is the
/// authority) and never changes for the life of the match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Owns room state, round/turn progression, judgement, and resets.
    Authority,
    /// Owns only its own player state; mirrors everything else.
    Follower,
}

// =============================================================================
// INPUTS AND OUTPUTS
// =============================================================================

/// A local player's intent, queued by presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerCommand {
    /// Commit a card for this round.
    PlaceCard(CardType),
    /// Spend the one-per-match special skill.
    ActivateSkill,
    /// Vote for a rematch after the match ends.
    RequestRetry,
}

/// Everything the transport can deliver to a driver.
#[derive(Clone, Debug, PartialEq)]
pub enum PeerEvent {
    /// Both peers are in the room; the match may start.
    MatchReady,
    /// A replicated player field changed.
    PlayerProperty {
        /// Whose record changed.
        seat: Seat,
        /// The field update.
        prop: PlayerProp,
    },
    /// A replicated room field changed.
    RoomProperty {
        /// The field update.
        prop: RoomProp,
    },
    /// The authority began a turn; the transport assigned it an id.
    TurnBegan {
        /// Transport-assigned turn number.
        turn_id: u32,
    },
    /// A player sent its final move for a turn.
    PlayerFinished {
        /// Who finished.
        seat: Seat,
        /// The turn the final move belongs to.
        turn_id: u32,
    },
    /// The transport's own turn timer elapsed. Observed and logged; the
    /// local countdown owns timeout behavior.
    TurnTimedOut {
        /// Which turn timed out.
        turn_id: u32,
    },
    /// An authority broadcast arrived.
    Signal {
        /// The sending seat.
        from: Seat,
        /// The payload.
        signal: Signal,
    },
    /// The other peer disconnected. The match halts here.
    PeerLeft,
}

/// Fan-out scope for a broadcast.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastTarget {
    /// Every peer in the room, the sender included.
    All,
    /// Every peer except the sender.
    Others,
}

/// One side effect for the shell to apply.
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    /// Replicate a player field update.
    SetPlayerProp {
        /// Whose record to update.
        seat: Seat,
        /// The field update.
        prop: PlayerProp,
    },
    /// Replicate a room field update. Authority only.
    SetRoomProp {
        /// The field update.
        prop: RoomProp,
    },
    /// Start a turn on the turn channel. Authority only.
    BeginTurn,
    /// Send a move on the turn channel.
    SendMove {
        /// The turn this move belongs to.
        turn_id: u32,
        /// Whether this closes the sender's turn.
        finished: bool,
    },
    /// Fan out a match signal.
    Broadcast {
        /// The payload.
        signal: Signal,
        /// Who receives it.
        target: BroadcastTarget,
    },
    /// Tell presentation something happened.
    Notify(Notification),
}

/// Proof that this driver is the authority.
///
/// Only [`BattleDriver::as_authority`] creates one, so any code path
/// that takes an `Authority` is unreachable on a follower.
#[derive(Clone, Copy)]
struct Authority(());

// =============================================================================
// DRIVER
// =============================================================================

/// The per-peer match driver.
///
/// One instance per peer per room. The public surface is commands,
/// events, and ticks; there are no setters. Mutations flow through the
/// owner's command handlers or, with the [`Authority`] token, through
/// the authority's transitions, so writer discipline is structural
/// rather than a convention.
pub struct BattleDriver {
    config: MatchConfig,
    role: Role,
    seat: Seat,
    match_seed: u64,
    rng: DeterministicRng,

    players: PerSeat<PlayerState>,
    room: RoomState,
    coordinator: TurnCoordinator,
    scores: ScoreKeeper,

    started: bool,
    match_over: bool,
    halted: bool,
    matches_played: u32,
    current_turn: Option<u32>,

    // Authority-internal latches, reset at round/match boundaries.
    round_judged: bool,
    skill_direction_done: PerSeat<bool>,

    // Pending second-granularity timers.
    commit_delay: Option<u32>,
    result_dwell: Option<u32>,
    direction_timer: Option<u32>,

    effects: Vec<Effect>,
}

impl BattleDriver {
    /// Create a driver for one seat of a match.
    ///
    /// `match_seed` comes from the transport handshake and is shared by
    /// both peers; each seat draws from its own RNG lane so forced picks
    /// never consume the coin flip's sequence.
    pub fn new(config: MatchConfig, role: Role, seat: Seat, match_seed: u64) -> Self {
        Self {
            config,
            role,
            seat,
            match_seed,
            rng: DeterministicRng::for_lane(match_seed, seat.index() as u64),
            players: PerSeat::new(PlayerState::new(), PlayerState::new()),
            room: RoomState::new(),
            coordinator: TurnCoordinator::new(config.countdown_secs),
            scores: ScoreKeeper::new(config.base_points, config.skill_multiplier),
            started: false,
            match_over: false,
            halted: false,
            matches_played: 0,
            current_turn: None,
            round_judged: false,
            skill_direction_done: PerSeat::default(),
            commit_delay: None,
            result_dwell: None,
            direction_timer: None,
            effects: Vec::new(),
        }
    }

    /// This driver's seat.
    pub fn seat(&self) -> Seat {
        self.seat
    }

    /// Whether this peer owns room state and match progression.
    pub fn is_authority(&self) -> bool {
        self.role == Role::Authority
    }

    /// The shared room state as this peer sees it.
    pub fn room(&self) -> &RoomState {
        &self.room
    }

    /// A player record as this peer sees it.
    pub fn player(&self, seat: Seat) -> &PlayerState {
        &self.players[seat]
    }

    /// Whether the match has concluded (and a rematch vote is open).
    pub fn is_match_over(&self) -> bool {
        self.match_over
    }

    /// Whether the match halted because the other peer left.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Seconds left on the selection countdown.
    pub fn countdown_remaining(&self) -> u32 {
        self.coordinator.countdown_remaining()
    }

    /// Whether the selection countdown is running.
    pub fn countdown_running(&self) -> bool {
        self.coordinator.countdown_running()
    }

    /// Digest of the replicated match state, for drift detection.
    pub fn state_digest(&self) -> StateHash {
        compute_state_hash(self.room.round, self.match_seed, |hasher| {
            self.room.hash_into(hasher);
            for seat in Seat::BOTH {
                self.players[seat].hash_into(hasher);
            }
        })
    }

    /// Take everything the last inputs produced.
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        mem::take(&mut self.effects)
    }

    // =========================================================================
    // INPUT: PRESENTATION COMMANDS
    // =========================================================================

    /// Apply one local player command.
    ///
    /// Invalid commands are silent no-ops; the match cannot be corrupted
    /// from the local side, only ignored.
    pub fn handle_command(&mut self, command: PlayerCommand) {
        if self.halted {
            debug!(?command, "command ignored, match halted");
            return;
        }
        match command {
            PlayerCommand::PlaceCard(card) => self.place_card(card),
            PlayerCommand::ActivateSkill => self.activate_skill(),
            PlayerCommand::RequestRetry => self.request_retry(),
        }
        self.reconcile();
    }

    fn place_card(&mut self, card: CardType) {
        if self.match_over {
            debug!("card placement ignored after match end");
            return;
        }
        if !matches!(self.room.phase, BattlePhase::Selection | BattlePhase::Selected) {
            debug!(phase = ?self.room.phase, "card placement ignored outside selection");
            return;
        }
        if self.players[self.seat].is_field_card_placed {
            debug!("duplicate card placement ignored");
            return;
        }
        self.commit_card(card, false);
    }

    fn activate_skill(&mut self) {
        if self.match_over {
            debug!("skill activation ignored after match end");
            return;
        }
        if !matches!(self.room.phase, BattlePhase::Selection | BattlePhase::Selected) {
            debug!(phase = ?self.room.phase, "skill activation ignored outside selection");
            return;
        }
        let me = &self.players[self.seat];
        if !me.can_use_skill || me.is_using_skill_this_round {
            debug!("skill activation ignored, skill unavailable");
            return;
        }
        self.write_own(PlayerProp::IsUsingSkillThisRound(true));
        self.write_own(PlayerProp::CanUseSkill(false));
        self.notify(Notification::SkillActivated { seat: self.seat });
        info!(seat = ?self.seat, "special skill activated");
    }

    fn request_retry(&mut self) {
        if !retry::request_is_valid(self.match_over, &self.players[self.seat]) {
            debug!("retry request ignored");
            return;
        }
        self.write_own(PlayerProp::IsRequestingRetry(true));
        info!(seat = ?self.seat, "rematch requested");
    }

    /// Commit a card for this seat through the one true path, whether
    /// chosen by the player or forced by the countdown.
    fn commit_card(&mut self, card: CardType, auto: bool) {
        self.write_own(PlayerProp::SelectedCard(Some(card)));
        self.write_own(PlayerProp::IsFieldCardPlaced(true));
        self.notify(Notification::CardPlaced {
            seat: self.seat,
            card: Some(card),
            auto,
        });

        // A committing follower observes Selected at once, ahead of the
        // authority's shared write catching up.
        if !self.is_authority() && self.room.phase == BattlePhase::Selection {
            self.apply_room_prop(RoomProp::Phase(BattlePhase::Selected));
        }

        if self.config.post_commit_delay_secs == 0 {
            self.write_own(PlayerProp::IsMyTurnEnded(true));
        } else {
            self.commit_delay = Some(self.config.post_commit_delay_secs);
        }
    }

    // =========================================================================
    // INPUT: TRANSPORT EVENTS
    // =========================================================================

    /// Apply one transport event.
    pub fn handle_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::MatchReady => {
                if let Some(auth) = self.as_authority() {
                    if self.started {
                        debug!("duplicate match-ready ignored");
                    } else {
                        self.start_match(auth);
                    }
                }
            }
            PeerEvent::PlayerProperty { seat, prop } => {
                self.apply_player_prop(seat, prop);
            }
            PeerEvent::RoomProperty { prop } => {
                self.apply_room_prop(prop);
            }
            PeerEvent::TurnBegan { turn_id } => self.on_turn_began(turn_id),
            PeerEvent::PlayerFinished { seat, turn_id } => {
                self.on_player_finished(seat, turn_id)
            }
            PeerEvent::TurnTimedOut { turn_id } => {
                debug!(turn_id, "transport turn timer elapsed");
            }
            PeerEvent::Signal { from, signal } => self.on_signal(from, signal),
            PeerEvent::PeerLeft => self.on_peer_left(),
        }
        self.reconcile();
    }

    fn on_turn_began(&mut self, turn_id: u32) {
        if self.current_turn == Some(turn_id) {
            debug!(turn_id, "stale turn-begin ignored");
            return;
        }
        if self.match_over {
            debug!(turn_id, "turn-begin after match end ignored");
            return;
        }
        self.current_turn = Some(turn_id);
        if let Some(auth) = self.as_authority() {
            self.write_room(auth, RoomProp::Phase(BattlePhase::Selection));
        }
        self.coordinator.restart_countdown();
        self.notify(Notification::CountdownTick {
            remaining_secs: self.coordinator.countdown_secs(),
        });
        debug!(turn_id, "turn began");
    }

    fn on_player_finished(&mut self, seat: Seat, turn_id: u32) {
        debug!(?seat, turn_id, "player finished its turn");
        let Some(auth) = self.as_authority() else {
            return;
        };
        // A finish can trail its round's judgement through the relay;
        // the flip rule only applies to the turn still in selection.
        if self.current_turn != Some(turn_id) {
            debug!(turn_id, "finish for a concluded turn ignored");
            return;
        }
        if !matches!(self.room.phase, BattlePhase::Selection | BattlePhase::Selected) {
            debug!(phase = ?self.room.phase, "finish after judgement ignored");
            return;
        }
        let placed = self.players[seat].is_field_card_placed;
        if TurnCoordinator::should_flip(placed) {
            let next = seat.other();
            info!(from = ?seat, to = ?next, "initiative flips");
            self.write_player(auth, seat, PlayerProp::IsMyTurn(false));
            self.write_player(auth, next, PlayerProp::IsMyTurn(true));
            self.broadcast(Signal::CountdownReset, BroadcastTarget::All);
        }
    }

    fn on_signal(&mut self, from: Seat, signal: Signal) {
        match signal {
            Signal::RoundStart { round, fresh_match } => {
                self.commit_delay = None;
                self.round_judged = false;
                self.skill_direction_done = PerSeat::default();
                if fresh_match {
                    let is_rematch = self.matches_played > 0;
                    self.match_over = false;
                    if is_rematch {
                        self.notify(Notification::MatchRestarted);
                    }
                }
                self.notify(Notification::RoundStarted {
                    round,
                    max_rounds: self.config.max_rounds,
                });
                info!(round, fresh_match, "round started");
            }
            Signal::CountdownReset => {
                if self.match_over {
                    debug!("countdown reset after match end ignored");
                    return;
                }
                self.coordinator.restart_countdown();
                self.notify(Notification::CountdownTick {
                    remaining_secs: self.coordinator.countdown_secs(),
                });
            }
            Signal::RoundResult { cards, winner, awards, digest } => {
                if from != self.seat && digest != self.state_digest() {
                    warn!(?from, "state digest mismatch after round result");
                }
                let judgement = match winner {
                    Some(seat) if seat == self.seat => Judgement::Win,
                    Some(_) => Judgement::Lose,
                    None => Judgement::Draw,
                };
                self.notify(Notification::RoundJudged {
                    own_card: cards[self.seat],
                    opponent_card: cards[self.seat.other()],
                    judgement,
                    points_gained: awards[self.seat],
                    own_points: self.players[self.seat].points,
                    opponent_points: self.players[self.seat.other()].points,
                });
            }
            Signal::MatchEnd => {
                if self.match_over {
                    debug!("duplicate match-end ignored");
                    return;
                }
                self.match_over = true;
                self.matches_played += 1;
                self.commit_delay = None;
                self.result_dwell = None;
                self.direction_timer = None;
                self.coordinator.stop_countdown();
                let own_points = self.players[self.seat].points;
                let opponent_points = self.players[self.seat.other()].points;
                let outcome = match_outcome(own_points, opponent_points);
                info!(?outcome, own_points, opponent_points, "match ended");
                self.notify(Notification::MatchEnded {
                    outcome,
                    own_points,
                    opponent_points,
                });
            }
        }
    }

    fn on_peer_left(&mut self) {
        if self.halted {
            return;
        }
        warn!("opponent left, halting match");
        self.halted = true;
        self.commit_delay = None;
        self.result_dwell = None;
        self.direction_timer = None;
        self.coordinator.stop_countdown();
        self.notify(Notification::OpponentLeft);
    }

    // =========================================================================
    // INPUT: SCHEDULER TICK
    // =========================================================================

    /// Advance one second of match time.
    pub fn handle_tick(&mut self) {
        if self.halted {
            return;
        }

        // Post-commit delay raises the owner's turn-ended flag.
        if let Some(secs) = self.commit_delay {
            if secs <= 1 {
                self.commit_delay = None;
                if !self.match_over {
                    self.write_own(PlayerProp::IsMyTurnEnded(true));
                }
            } else {
                self.commit_delay = Some(secs - 1);
            }
        }

        if let Some(auth) = self.as_authority() {
            // Skill direction runs out and the countdown refills.
            if let Some(secs) = self.direction_timer {
                if secs <= 1 {
                    self.direction_timer = None;
                    self.write_room(auth, RoomProp::IsDirectingSkill(false));
                    if !self.match_over {
                        self.broadcast(Signal::CountdownReset, BroadcastTarget::All);
                    }
                } else {
                    self.direction_timer = Some(secs - 1);
                }
            }

            // Result dwell runs out and the round advances.
            if let Some(secs) = self.result_dwell {
                if secs <= 1 {
                    self.result_dwell = None;
                    self.advance_round(auth);
                } else {
                    self.result_dwell = Some(secs - 1);
                }
            }
        }

        match self.coordinator.tick_countdown() {
            CountdownStep::Idle => {}
            CountdownStep::Ticked(remaining_secs) => {
                self.notify(Notification::CountdownTick { remaining_secs });
            }
            CountdownStep::Expired => self.on_countdown_expired(),
        }

        self.reconcile();
    }

    fn on_countdown_expired(&mut self) {
        if !TurnCoordinator::timeout_forces_pick(self.room.phase, &self.players[self.seat]) {
            debug!("countdown expired with nothing to force");
            return;
        }
        let picked = self
            .coordinator
            .pick_random_card(&mut self.rng, &self.players[self.seat]);
        if let Some(card) = picked {
            info!(?card, "countdown expired, committing a random card");
            self.commit_card(card, true);
        }
    }

    // =========================================================================
    // LEVEL-TRIGGERED RECONCILIATION
    // =========================================================================

    /// Re-evaluate every condition the current state can satisfy.
    ///
    /// Runs after each input. Safe to run any number of times: every
    /// branch is guarded by state that the branch itself retires.
    fn reconcile(&mut self) {
        // Consume our own finished-turn flag into a final move, stamped
        // with the turn it belongs to.
        if self.players[self.seat].is_my_turn_ended {
            self.write_own(PlayerProp::IsMyTurnEnded(false));
            let turn_id = self.current_turn.unwrap_or(0);
            self.effects.push(Effect::SendMove { turn_id, finished: true });
        }

        // Skill direction suspends the countdown everywhere.
        if self.room.is_directing_skill && self.coordinator.countdown_running() {
            self.coordinator.pause_countdown();
        }

        let Some(auth) = self.as_authority() else {
            return;
        };

        // The first commit advances the shared phase.
        let any_placed = Seat::BOTH
            .iter()
            .any(|&seat| self.players[seat].is_field_card_placed);
        if self.room.phase == BattlePhase::Selection && any_placed {
            self.write_room(auth, RoomProp::Phase(BattlePhase::Selected));
        }

        // A newly observed skill activation starts its direction window.
        for seat in Seat::BOTH {
            if self.players[seat].is_using_skill_this_round && !self.skill_direction_done[seat] {
                self.skill_direction_done[seat] = true;
                self.write_room(auth, RoomProp::IsDirectingSkill(true));
                self.direction_timer = Some(self.config.skill_direction_secs.max(1));
                info!(?seat, "skill direction running");
            }
        }

        // Both cards down exactly once per round: judge.
        let both_placed = Seat::BOTH
            .iter()
            .all(|&seat| self.players[seat].is_field_card_placed);
        if !self.round_judged
            && both_placed
            && matches!(self.room.phase, BattlePhase::Selection | BattlePhase::Selected)
        {
            self.judge_round(auth);
        }

        // Unanimous rematch vote resets the match.
        if self.match_over && retry::rematch_agreed(&self.players) {
            info!("both players voted for a rematch");
            self.start_match(auth);
        }
    }

    // =========================================================================
    // AUTHORITY TRANSITIONS
    // =========================================================================

    /// Initialize and start a match (first start and every rematch).
    fn start_match(&mut self, auth: Authority) {
        self.started = true;
        self.match_over = false;
        self.round_judged = false;
        self.skill_direction_done = PerSeat::default();
        self.commit_delay = None;
        self.result_dwell = None;
        self.direction_timer = None;

        self.write_room(auth, RoomProp::Round(INITIAL_ROUND));
        self.write_room(auth, RoomProp::Phase(BattlePhase::None));
        self.write_room(auth, RoomProp::IsDirectingSkill(false));
        for seat in Seat::BOTH {
            self.write_player(auth, seat, PlayerProp::IsMyTurn(false));
            self.write_player(auth, seat, PlayerProp::IsMyTurnEnded(false));
            self.write_player(auth, seat, PlayerProp::IsFieldCardPlaced(false));
            self.write_player(auth, seat, PlayerProp::SelectedCard(None));
            self.write_player(auth, seat, PlayerProp::IsUsingSkillThisRound(false));
            self.write_player(auth, seat, PlayerProp::CanUseSkill(true));
            self.write_player(auth, seat, PlayerProp::Points(0));
            self.write_player(auth, seat, PlayerProp::IsRequestingRetry(false));
        }

        let holder = self.coordinator.decide_first_holder(&mut self.rng);
        self.write_player(auth, holder, PlayerProp::IsMyTurn(true));
        info!(?holder, "match starting");

        self.broadcast(
            Signal::RoundStart { round: INITIAL_ROUND, fresh_match: true },
            BroadcastTarget::All,
        );
        self.effects.push(Effect::BeginTurn);
    }

    /// Judge the two committed cards and announce the result.
    fn judge_round(&mut self, auth: Authority) {
        let (Some(host_card), Some(guest_card)) = (
            self.players[Seat::Host].selected_card,
            self.players[Seat::Guest].selected_card,
        ) else {
            debug_assert!(false, "judgement reached with a missing card");
            warn!("judgement skipped, a committed card is missing");
            return;
        };

        self.round_judged = true;
        self.write_room(auth, RoomProp::Phase(BattlePhase::Judgement));

        let host_judgement = judge(host_card, guest_card);
        let awards = PerSeat::new(
            self.scores
                .award(host_judgement, self.players[Seat::Host].is_using_skill_this_round),
            self.scores.award(
                host_judgement.invert(),
                self.players[Seat::Guest].is_using_skill_this_round,
            ),
        );
        for seat in Seat::BOTH {
            let gained = awards[seat];
            if gained > 0 {
                let total = self.players[seat].points + gained;
                self.write_player(auth, seat, PlayerProp::Points(total));
            }
        }

        self.write_room(auth, RoomProp::Phase(BattlePhase::Result));

        let winner = match host_judgement {
            Judgement::Win => Some(Seat::Host),
            Judgement::Lose => Some(Seat::Guest),
            Judgement::Draw => None,
        };
        info!(round = self.room.round, ?winner, "round judged");

        let digest = self.state_digest();
        self.broadcast(
            Signal::RoundResult {
                cards: PerSeat::new(host_card, guest_card),
                winner,
                awards,
                digest,
            },
            BroadcastTarget::All,
        );

        if self.config.result_dwell_secs == 0 {
            self.advance_round(auth);
        } else {
            self.result_dwell = Some(self.config.result_dwell_secs);
        }
    }

    /// Clear the round and either start the next one or end the match.
    fn advance_round(&mut self, auth: Authority) {
        for seat in Seat::BOTH {
            self.write_player(auth, seat, PlayerProp::IsFieldCardPlaced(false));
            self.write_player(auth, seat, PlayerProp::SelectedCard(None));
            self.write_player(auth, seat, PlayerProp::IsUsingSkillThisRound(false));
            self.write_player(auth, seat, PlayerProp::IsMyTurnEnded(false));
        }
        // An open skill-direction window does not outlive its round.
        self.write_room(auth, RoomProp::IsDirectingSkill(false));
        self.direction_timer = None;
        self.round_judged = false;
        self.skill_direction_done = PerSeat::default();

        if self.room.round < self.config.max_rounds {
            let next = self.room.round + 1;
            info!(round = next, "advancing to the next round");
            self.write_room(auth, RoomProp::Round(next));
            self.broadcast(
                Signal::RoundStart { round: next, fresh_match: false },
                BroadcastTarget::All,
            );
            self.effects.push(Effect::BeginTurn);
        } else {
            info!("final round complete, ending match");
            self.broadcast(Signal::MatchEnd, BroadcastTarget::All);
        }
    }

    // =========================================================================
    // STATE APPLICATION AND WRITE PATHS
    // =========================================================================

    /// The authority token, if this driver is the authority.
    fn as_authority(&self) -> Option<Authority> {
        match self.role {
            Role::Authority => Some(Authority(())),
            Role::Follower => None,
        }
    }

    /// Apply a player update and surface the edges presentation cares
    /// about. Used for both local writes and replicated arrivals, so the
    /// echo of an own write is a clean no-op.
    fn apply_player_prop(&mut self, seat: Seat, prop: PlayerProp) -> bool {
        let changed = self.players[seat].apply(prop);
        if changed {
            match prop {
                PlayerProp::IsMyTurn(true) => {
                    self.notify(Notification::TurnChanged { holder: seat });
                }
                // Remote placements and skills are announced here; the
                // local seat announces its own with full detail at the
                // command site. The card value stays masked.
                PlayerProp::IsFieldCardPlaced(true) if seat != self.seat => {
                    self.notify(Notification::CardPlaced { seat, card: None, auto: false });
                }
                PlayerProp::IsUsingSkillThisRound(true) if seat != self.seat => {
                    self.notify(Notification::SkillActivated { seat });
                }
                _ => {}
            }
        }
        changed
    }

    /// Apply a room update and its local reactions.
    fn apply_room_prop(&mut self, prop: RoomProp) -> bool {
        let changed = self.room.apply(prop);
        if changed {
            match prop {
                RoomProp::Phase(phase) => {
                    self.notify(Notification::PhaseChanged { phase });
                    if phase == BattlePhase::Judgement {
                        self.coordinator.stop_countdown();
                    }
                }
                RoomProp::IsDirectingSkill(true) => self.coordinator.pause_countdown(),
                _ => {}
            }
        }
        changed
    }

    /// Write a field of our own player record and replicate it.
    fn write_own(&mut self, prop: PlayerProp) {
        let seat = self.seat;
        if self.apply_player_prop(seat, prop) {
            self.effects.push(Effect::SetPlayerProp { seat, prop });
        }
    }

    /// Authority write to either player record (initiative, points,
    /// round-boundary clears).
    fn write_player(&mut self, _auth: Authority, seat: Seat, prop: PlayerProp) {
        if self.apply_player_prop(seat, prop) {
            self.effects.push(Effect::SetPlayerProp { seat, prop });
        }
    }

    /// Authority write to the room record.
    fn write_room(&mut self, _auth: Authority, prop: RoomProp) {
        if self.apply_room_prop(prop) {
            self.effects.push(Effect::SetRoomProp { prop });
        }
    }

    fn broadcast(&mut self, signal: Signal, target: BroadcastTarget) {
        self.effects.push(Effect::Broadcast { signal, target });
    }

    fn notify(&mut self, notification: Notification) {
        self.effects.push(Effect::Notify(notification));
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::battle::player::Seat;

    /// Two drivers joined by a lossless in-order link, pumped by hand.
    /// This is the relay's delivery contract without the sockets.
    struct TestNet {
        drivers: PerSeat<BattleDriver>,
        queues: PerSeat<VecDeque<PeerEvent>>,
        notes: PerSeat<Vec<Notification>>,
        next_turn: u32,
    }

    impl TestNet {
        fn start(config: MatchConfig) -> Self {
            Self::start_seeded(config, 424242)
        }

        fn start_seeded(config: MatchConfig, seed: u64) -> Self {
            let mut net = Self {
                drivers: PerSeat::new(
                    BattleDriver::new(config, Role::Authority, Seat::Host, seed),
                    BattleDriver::new(config, Role::Follower, Seat::Guest, seed),
                ),
                queues: PerSeat::default(),
                notes: PerSeat::new(Vec::new(), Vec::new()),
                next_turn: 0,
            };
            for seat in Seat::BOTH {
                net.queues[seat].push_back(PeerEvent::MatchReady);
            }
            net.pump();
            net
        }

        fn command(&mut self, seat: Seat, command: PlayerCommand) {
            self.drivers[seat].handle_command(command);
            self.route(seat);
            self.pump();
        }

        fn tick_second(&mut self) {
            for seat in Seat::BOTH {
                self.drivers[seat].handle_tick();
                self.route(seat);
            }
            self.pump();
        }

        fn pump(&mut self) {
            loop {
                let mut idle = true;
                for seat in Seat::BOTH {
                    if let Some(event) = self.queues[seat].pop_front() {
                        idle = false;
                        self.drivers[seat].handle_event(event);
                        self.route(seat);
                    }
                }
                if idle {
                    break;
                }
            }
        }

        /// Convert one driver's drained effects into deliveries, echo to
        /// the sender included, exactly as the relay fans out.
        fn route(&mut self, from: Seat) {
            for effect in self.drivers[from].drain_effects() {
                match effect {
                    Effect::SetPlayerProp { seat, prop } => {
                        self.deliver_all(PeerEvent::PlayerProperty { seat, prop });
                    }
                    Effect::SetRoomProp { prop } => {
                        self.deliver_all(PeerEvent::RoomProperty { prop });
                    }
                    Effect::BeginTurn => {
                        self.next_turn += 1;
                        let turn_id = self.next_turn;
                        self.deliver_all(PeerEvent::TurnBegan { turn_id });
                    }
                    Effect::SendMove { turn_id, finished } => {
                        if finished {
                            self.deliver_all(PeerEvent::PlayerFinished { seat: from, turn_id });
                        }
                    }
                    Effect::Broadcast { signal, target } => {
                        for seat in Seat::BOTH {
                            if target == BroadcastTarget::Others && seat == from {
                                continue;
                            }
                            self.queues[seat].push_back(PeerEvent::Signal {
                                from,
                                signal: signal.clone(),
                            });
                        }
                    }
                    Effect::Notify(note) => self.notes[from].push(note),
                }
            }
        }

        fn deliver_all(&mut self, event: PeerEvent) {
            for seat in Seat::BOTH {
                self.queues[seat].push_back(event.clone());
            }
        }

        fn holder(&self) -> Seat {
            if self.drivers[Seat::Host].player(Seat::Host).is_my_turn {
                Seat::Host
            } else {
                Seat::Guest
            }
        }

        fn place_winning_pair(&mut self, winner: Seat) {
            // Princess beats Brave
            self.command(winner, PlayerCommand::PlaceCard(CardType::Princess));
            self.command(winner.other(), PlayerCommand::PlaceCard(CardType::Brave));
        }
    }

    /// Config that collapses all dwell times so a round resolves inside
    /// a single command exchange.
    fn quick_config() -> MatchConfig {
        MatchConfig {
            post_commit_delay_secs: 0,
            result_dwell_secs: 0,
            ..MatchConfig::default()
        }
    }

    #[test]
    fn test_match_config_defaults() {
        let config = MatchConfig::default();
        assert_eq!(config.max_rounds, 3);
        assert_eq!(config.base_points, 1);
        assert_eq!(config.skill_multiplier, 2);
        assert_eq!(config.countdown_secs, 10);
    }

    #[test]
    fn test_coin_flip_assigns_exactly_one_holder() {
        let net = TestNet::start(quick_config());
        for seat in Seat::BOTH {
            let driver = &net.drivers[seat];
            let holders: Vec<Seat> = Seat::BOTH
                .into_iter()
                .filter(|&s| driver.player(s).is_my_turn)
                .collect();
            assert_eq!(holders.len(), 1, "exactly one initiative holder");
        }
        // Both peers agree on who it is
        assert_eq!(
            net.drivers[Seat::Host].player(Seat::Host).is_my_turn,
            net.drivers[Seat::Guest].player(Seat::Host).is_my_turn
        );
        // And the round is underway
        assert_eq!(net.drivers[Seat::Guest].room().phase, BattlePhase::Selection);
        assert_eq!(net.drivers[Seat::Guest].room().round, 1);
    }

    #[test]
    fn test_full_match_host_wins_every_round() {
        let mut net = TestNet::start(quick_config());

        for round in 1..=3 {
            assert_eq!(net.drivers[Seat::Host].room().round, round);
            net.place_winning_pair(Seat::Host);
        }

        for seat in Seat::BOTH {
            assert!(net.drivers[seat].is_match_over());
        }
        assert_eq!(net.drivers[Seat::Guest].player(Seat::Host).points, 3);
        assert_eq!(net.drivers[Seat::Guest].player(Seat::Guest).points, 0);

        let host_end = net.notes[Seat::Host]
            .iter()
            .find_map(|n| match n {
                Notification::MatchEnded { outcome, own_points, opponent_points } => {
                    Some((*outcome, *own_points, *opponent_points))
                }
                _ => None,
            })
            .expect("host saw the match end");
        assert_eq!(host_end, (Judgement::Win, 3, 0));

        let guest_end = net.notes[Seat::Guest]
            .iter()
            .find_map(|n| match n {
                Notification::MatchEnded { outcome, .. } => Some(*outcome),
                _ => None,
            })
            .expect("guest saw the match end");
        assert_eq!(guest_end, Judgement::Lose);

        // Peers never drifted
        assert_eq!(
            net.drivers[Seat::Host].state_digest(),
            net.drivers[Seat::Guest].state_digest()
        );
    }

    #[test]
    fn test_equal_totals_draw_the_match() {
        let mut net = TestNet::start(quick_config());

        net.place_winning_pair(Seat::Host);
        net.place_winning_pair(Seat::Guest);
        // Identical cards draw the last round
        net.command(Seat::Host, PlayerCommand::PlaceCard(CardType::Devil));
        net.command(Seat::Guest, PlayerCommand::PlaceCard(CardType::Devil));

        for seat in Seat::BOTH {
            let outcome = net.notes[seat]
                .iter()
                .find_map(|n| match n {
                    Notification::MatchEnded { outcome, .. } => Some(*outcome),
                    _ => None,
                })
                .expect("match ended");
            assert_eq!(outcome, Judgement::Draw);
        }
    }

    #[test]
    fn test_round_judged_notifications_are_mirrored() {
        let mut net = TestNet::start(quick_config());
        net.place_winning_pair(Seat::Guest);

        let host_view = net.notes[Seat::Host]
            .iter()
            .find_map(|n| match n {
                Notification::RoundJudged { own_card, opponent_card, judgement, .. } => {
                    Some((*own_card, *opponent_card, *judgement))
                }
                _ => None,
            })
            .expect("host judged");
        let guest_view = net.notes[Seat::Guest]
            .iter()
            .find_map(|n| match n {
                Notification::RoundJudged { own_card, opponent_card, judgement, .. } => {
                    Some((*own_card, *opponent_card, *judgement))
                }
                _ => None,
            })
            .expect("guest judged");

        assert_eq!(host_view.0, guest_view.1);
        assert_eq!(host_view.1, guest_view.0);
        assert_eq!(host_view.2, guest_view.2.invert());
    }

    #[test]
    fn test_turn_end_without_placement_flips_initiative() {
        let mut driver = BattleDriver::new(quick_config(), Role::Authority, Seat::Host, 7);
        driver.handle_event(PeerEvent::MatchReady);
        driver.handle_event(PeerEvent::TurnBegan { turn_id: 1 });
        driver.drain_effects();

        let holder = if driver.player(Seat::Host).is_my_turn {
            Seat::Host
        } else {
            Seat::Guest
        };

        // The holder's peer reports a finished turn with no card down.
        driver.handle_event(PeerEvent::PlayerFinished { seat: holder, turn_id: 1 });

        assert!(!driver.player(holder).is_my_turn);
        assert!(driver.player(holder.other()).is_my_turn);
        let effects = driver.drain_effects();
        assert!(
            effects.iter().any(|e| matches!(
                e,
                Effect::Broadcast { signal: Signal::CountdownReset, .. }
            )),
            "flip refreshes the countdown"
        );
    }

    #[test]
    fn test_turn_end_after_placement_keeps_initiative() {
        let mut net = TestNet::start(quick_config());
        let holder = net.holder();

        // Holder commits; with no post-commit delay the turn ends at once
        // and the finished message makes the round trip.
        net.command(holder, PlayerCommand::PlaceCard(CardType::Princess));

        for seat in Seat::BOTH {
            assert!(
                net.drivers[seat].player(holder).is_my_turn,
                "initiative stays after placing"
            );
            assert!(!net.drivers[seat].player(holder.other()).is_my_turn);
        }
    }

    #[test]
    fn test_trailing_finish_after_round_advance_keeps_initiative() {
        let mut net = TestNet::start(quick_config());
        let holder = net.holder();

        // The non-holder commits first. The holder's commit then judges
        // and advances the round before its own finished message echoes
        // back, so the echo meets already-cleared placement flags.
        net.command(holder.other(), PlayerCommand::PlaceCard(CardType::Brave));
        net.command(holder, PlayerCommand::PlaceCard(CardType::Princess));

        assert_eq!(net.drivers[Seat::Host].room().round, 2);
        for seat in Seat::BOTH {
            assert!(
                net.drivers[seat].player(holder).is_my_turn,
                "initiative stays with the holder that placed"
            );
            assert!(!net.drivers[seat].player(holder.other()).is_my_turn);
        }
    }

    #[test]
    fn test_finish_from_a_previous_turn_is_ignored() {
        let mut net = TestNet::start(quick_config());
        let holder = net.holder();
        net.place_winning_pair(holder);
        assert_eq!(net.drivers[Seat::Host].room().round, 2);

        // A redelivered finish from round 1 reaches the authority while
        // round 2 is in selection and nobody has placed.
        net.drivers[Seat::Host].handle_event(PeerEvent::PlayerFinished {
            seat: holder,
            turn_id: 1,
        });

        assert_eq!(
            net.drivers[Seat::Host].drain_effects(),
            Vec::new(),
            "stale finish produces nothing"
        );
        assert!(net.drivers[Seat::Host].player(holder).is_my_turn);
        assert!(!net.drivers[Seat::Host].player(holder.other()).is_my_turn);
    }

    #[test]
    fn test_countdown_timeout_forces_a_card_on_the_holder() {
        let config = MatchConfig {
            countdown_secs: 3,
            post_commit_delay_secs: 0,
            result_dwell_secs: 0,
            ..MatchConfig::default()
        };
        let mut net = TestNet::start(config);
        let holder = net.holder();

        for _ in 0..3 {
            assert!(!net.drivers[holder].player(holder).is_field_card_placed);
            net.tick_second();
        }

        // The holder was forced; the other seat was not.
        for seat in Seat::BOTH {
            assert!(net.drivers[seat].player(holder).is_field_card_placed);
            assert!(!net.drivers[seat].player(holder.other()).is_field_card_placed);
        }
        assert!(net.notes[holder].iter().any(|n| matches!(
            n,
            Notification::CardPlaced { auto: true, .. }
        )));

        // Forced placement counts as placing: initiative does not flip.
        assert!(net.drivers[holder].player(holder).is_my_turn);

        // The other player is free to act and the round still resolves.
        net.command(holder.other(), PlayerCommand::PlaceCard(CardType::Princess));
        assert_eq!(net.drivers[Seat::Host].room().round, 2);
    }

    #[test]
    fn test_skill_doubles_the_round_award() {
        let mut net = TestNet::start(quick_config());

        net.command(Seat::Host, PlayerCommand::ActivateSkill);
        net.place_winning_pair(Seat::Host);

        for seat in Seat::BOTH {
            assert_eq!(net.drivers[seat].player(Seat::Host).points, 2);
            assert!(!net.drivers[seat].player(Seat::Host).can_use_skill);
        }
        // Both sides saw the activation
        for seat in Seat::BOTH {
            assert!(net.notes[seat]
                .iter()
                .any(|n| matches!(n, Notification::SkillActivated { seat: Seat::Host })));
        }
    }

    #[test]
    fn test_skill_is_single_use_per_match() {
        let mut net = TestNet::start(quick_config());

        net.command(Seat::Guest, PlayerCommand::ActivateSkill);
        net.place_winning_pair(Seat::Host);

        // Round 2: the skill is spent and stays spent.
        net.command(Seat::Guest, PlayerCommand::ActivateSkill);
        assert!(!net.drivers[Seat::Guest].player(Seat::Guest).is_using_skill_this_round);

        let activations = net.notes[Seat::Guest]
            .iter()
            .filter(|n| matches!(n, Notification::SkillActivated { .. }))
            .count();
        assert_eq!(activations, 1);
    }

    #[test]
    fn test_skill_direction_suspends_then_refills_countdown() {
        let config = MatchConfig {
            countdown_secs: 10,
            skill_direction_secs: 2,
            ..MatchConfig::default()
        };
        let mut net = TestNet::start(config);

        // Guest activates; the authority raises the direction flag.
        net.command(Seat::Guest, PlayerCommand::ActivateSkill);
        for seat in Seat::BOTH {
            assert!(net.drivers[seat].room().is_directing_skill);
            assert!(!net.drivers[seat].countdown_running(), "countdown suspended");
        }
        let frozen = net.drivers[Seat::Guest].countdown_remaining();

        // While directing, ticks change nothing.
        net.tick_second();
        assert_eq!(net.drivers[Seat::Guest].countdown_remaining(), frozen);

        // Direction ends; the countdown refills to full.
        net.tick_second();
        for seat in Seat::BOTH {
            assert!(!net.drivers[seat].room().is_directing_skill);
            assert!(net.drivers[seat].countdown_running());
            assert_eq!(net.drivers[seat].countdown_remaining(), 10);
        }
    }

    #[test]
    fn test_direction_window_closes_when_the_round_advances() {
        let config = MatchConfig {
            post_commit_delay_secs: 0,
            result_dwell_secs: 0,
            skill_direction_secs: 3,
            ..MatchConfig::default()
        };
        let mut net = TestNet::start(config);

        // Activation right before the final commit leaves no time for
        // the direction window to run out on its own.
        net.command(Seat::Host, PlayerCommand::PlaceCard(CardType::Princess));
        net.command(Seat::Guest, PlayerCommand::ActivateSkill);
        net.command(Seat::Guest, PlayerCommand::PlaceCard(CardType::Brave));

        assert_eq!(net.drivers[Seat::Host].room().round, 2);
        for seat in Seat::BOTH {
            assert!(!net.drivers[seat].room().is_directing_skill);
            assert!(
                net.drivers[seat].countdown_running(),
                "next round's countdown is not left paused"
            );
            assert_eq!(net.drivers[seat].countdown_remaining(), 10);
        }
    }

    #[test]
    fn test_retry_vote_resets_the_match() {
        let mut net = TestNet::start(quick_config());
        for _ in 0..3 {
            net.place_winning_pair(Seat::Host);
        }
        assert!(net.drivers[Seat::Host].is_match_over());

        // One vote alone does nothing.
        net.command(Seat::Guest, PlayerCommand::RequestRetry);
        assert!(net.drivers[Seat::Host].is_match_over());

        // The second vote resets everything.
        net.command(Seat::Host, PlayerCommand::RequestRetry);
        for seat in Seat::BOTH {
            let driver = &net.drivers[seat];
            assert!(!driver.is_match_over());
            assert_eq!(driver.room().round, 1);
            assert_eq!(driver.room().phase, BattlePhase::Selection);
            for s in Seat::BOTH {
                assert_eq!(driver.player(s).points, 0);
                assert!(driver.player(s).can_use_skill);
                assert!(!driver.player(s).is_requesting_retry);
            }
        }
        for seat in Seat::BOTH {
            assert!(net.notes[seat]
                .iter()
                .any(|n| matches!(n, Notification::MatchRestarted)));
        }
        // A fresh coin flip happened
        let holders: Vec<Seat> = Seat::BOTH
            .into_iter()
            .filter(|&s| net.drivers[Seat::Host].player(s).is_my_turn)
            .collect();
        assert_eq!(holders.len(), 1);
    }

    #[test]
    fn test_retry_before_match_end_is_ignored() {
        let mut net = TestNet::start(quick_config());
        net.command(Seat::Host, PlayerCommand::RequestRetry);
        assert!(!net.drivers[Seat::Host].player(Seat::Host).is_requesting_retry);
    }

    #[test]
    fn test_duplicate_placement_is_ignored() {
        let mut net = TestNet::start(quick_config());
        let holder = net.holder();
        net.command(holder, PlayerCommand::PlaceCard(CardType::Princess));
        net.command(holder, PlayerCommand::PlaceCard(CardType::Devil));

        for seat in Seat::BOTH {
            assert_eq!(
                net.drivers[seat].player(holder).selected_card,
                Some(CardType::Princess),
                "second placement must not overwrite the first"
            );
        }
    }

    #[test]
    fn test_redelivered_updates_change_nothing() {
        let mut net = TestNet::start(quick_config());
        net.command(Seat::Guest, PlayerCommand::PlaceCard(CardType::Brave));

        let driver = &mut net.drivers[Seat::Host];
        let room_before = driver.room().clone();
        let players_before = (
            driver.player(Seat::Host).clone(),
            driver.player(Seat::Guest).clone(),
        );
        let digest_before = driver.state_digest();

        // Replay a property update and a stale turn-begin.
        driver.handle_event(PeerEvent::PlayerProperty {
            seat: Seat::Guest,
            prop: PlayerProp::IsFieldCardPlaced(true),
        });
        driver.handle_event(PeerEvent::PlayerProperty {
            seat: Seat::Guest,
            prop: PlayerProp::SelectedCard(Some(CardType::Brave)),
        });
        driver.handle_event(PeerEvent::TurnBegan { turn_id: 1 });

        assert_eq!(driver.drain_effects(), Vec::new(), "no effects on redelivery");
        assert_eq!(driver.room(), &room_before);
        assert_eq!(driver.player(Seat::Host), &players_before.0);
        assert_eq!(driver.player(Seat::Guest), &players_before.1);
        assert_eq!(driver.state_digest(), digest_before);
    }

    #[test]
    fn test_commands_before_match_start_are_ignored() {
        let mut driver = BattleDriver::new(quick_config(), Role::Follower, Seat::Guest, 99);
        driver.handle_command(PlayerCommand::PlaceCard(CardType::Princess));
        driver.handle_command(PlayerCommand::ActivateSkill);
        driver.handle_command(PlayerCommand::RequestRetry);

        assert_eq!(driver.drain_effects(), Vec::new());
        assert!(!driver.player(Seat::Guest).is_field_card_placed);
    }

    #[test]
    fn test_peer_leaving_halts_the_match() {
        let mut net = TestNet::start(quick_config());
        net.drivers[Seat::Host].handle_event(PeerEvent::PeerLeft);
        net.route(Seat::Host);

        assert!(net.drivers[Seat::Host].is_halted());
        assert!(net.notes[Seat::Host]
            .iter()
            .any(|n| matches!(n, Notification::OpponentLeft)));

        // Commands after the halt do nothing.
        net.drivers[Seat::Host].handle_command(PlayerCommand::PlaceCard(CardType::Devil));
        assert!(!net.drivers[Seat::Host].player(Seat::Host).is_field_card_placed);
    }

    #[test]
    fn test_post_commit_delay_defers_turn_end() {
        let config = MatchConfig {
            post_commit_delay_secs: 2,
            result_dwell_secs: 0,
            ..MatchConfig::default()
        };
        let mut net = TestNet::start(config);
        let holder = net.holder();

        net.command(holder, PlayerCommand::PlaceCard(CardType::Princess));
        // Placed, but the turn has not ended yet.
        assert!(net.drivers[holder].player(holder).is_field_card_placed);

        net.tick_second();
        net.tick_second();

        // The finished message went out after the delay and, because the
        // holder had placed, initiative stayed put.
        assert!(net.drivers[holder].player(holder).is_my_turn);
        assert!(!net.drivers[holder].player(holder).is_my_turn_ended);
    }

    #[test]
    fn test_result_dwell_defers_round_advance() {
        let config = MatchConfig {
            post_commit_delay_secs: 0,
            result_dwell_secs: 2,
            ..MatchConfig::default()
        };
        let mut net = TestNet::start(config);
        net.place_winning_pair(Seat::Host);

        // Judged, dwelling on the result.
        assert_eq!(net.drivers[Seat::Guest].room().phase, BattlePhase::Result);
        assert_eq!(net.drivers[Seat::Guest].room().round, 1);

        net.tick_second();
        net.tick_second();

        assert_eq!(net.drivers[Seat::Guest].room().round, 2);
        assert_eq!(net.drivers[Seat::Guest].room().phase, BattlePhase::Selection);
    }

    #[test]
    fn test_random_schedules_never_drift() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        // Arbitrary interleavings of commands and ticks, checked for
        // divergence after every quiescent exchange.
        for trial in 0..8u64 {
            let mut rng = StdRng::seed_from_u64(0xD1CE + trial);
            let mut net = TestNet::start_seeded(quick_config(), rng.gen());

            for step in 0..400 {
                let seat = if rng.gen_bool(0.5) { Seat::Host } else { Seat::Guest };
                match rng.gen_range(0..5) {
                    0 => {
                        let card = CardType::ALL[rng.gen_range(0..CardType::ALL.len())];
                        net.command(seat, PlayerCommand::PlaceCard(card));
                    }
                    1 => net.command(seat, PlayerCommand::ActivateSkill),
                    2 => net.command(seat, PlayerCommand::RequestRetry),
                    _ => net.tick_second(),
                }

                assert_eq!(
                    net.drivers[Seat::Host].state_digest(),
                    net.drivers[Seat::Guest].state_digest(),
                    "peers drifted on trial {trial}, step {step}"
                );
            }
        }
    }
}
