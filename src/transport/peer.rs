//! Match Peer Shell
//!
//! Owns one [`BattleDriver`] and feeds it from three sources: frames
//! off the link, commands from the presentation side, and a one-second
//! ticker. Effects drain back out as frames and notifications after
//! every input. The driver never sees a socket and the socket never
//! sees match state.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::battle::driver::{BattleDriver, Effect, MatchConfig, PeerEvent, PlayerCommand, Role};
use crate::battle::events::Notification;
use crate::transport::loopback::LoopbackLink;
use crate::transport::protocol::{frame_for_effect, ClientFrame, ServerFrame};

/// The presentation side's grip on a running peer.
pub struct PeerHandle {
    /// Player commands into the match.
    pub commands: mpsc::Sender<PlayerCommand>,
    /// Notifications out of the match. Closes when the peer stops.
    pub notifications: mpsc::Receiver<Notification>,
}

/// One seat's running half of a match.
pub struct MatchPeer {
    driver: BattleDriver,
    frames_out: mpsc::Sender<ClientFrame>,
    frames_in: mpsc::Receiver<ServerFrame>,
    commands: mpsc::Receiver<PlayerCommand>,
    notifications: mpsc::Sender<Notification>,
}

impl MatchPeer {
    /// Wrap a driver around an established link.
    ///
    /// The driver must be built with the seed from the handshake, which
    /// means the room is already full when a peer exists.
    pub fn new(
        driver: BattleDriver,
        frames_out: mpsc::Sender<ClientFrame>,
        frames_in: mpsc::Receiver<ServerFrame>,
    ) -> (Self, PeerHandle) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (note_tx, note_rx) = mpsc::channel(64);

        let peer = Self {
            driver,
            frames_out,
            frames_in,
            commands: command_rx,
            notifications: note_tx,
        };
        let handle = PeerHandle {
            commands: command_tx,
            notifications: note_rx,
        };
        (peer, handle)
    }

    /// Build a peer straight from a loopback link.
    pub fn over_link(config: MatchConfig, link: LoopbackLink) -> (Self, PeerHandle) {
        let role = if link.handshake.authority {
            Role::Authority
        } else {
            Role::Follower
        };
        let driver = BattleDriver::new(
            config,
            role,
            link.handshake.seat,
            link.handshake.match_seed,
        );
        Self::new(driver, link.frames_out, link.frames_in)
    }

    /// Run the peer until the match halts or either side hangs up.
    pub async fn run(mut self) {
        // The link only exists once both peers are seated; telling the
        // driver is idempotent against the in-stream copy.
        self.driver.handle_event(PeerEvent::MatchReady);
        self.flush().await;

        let mut ticker = interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;

        loop {
            tokio::select! {
                frame = self.frames_in.recv() => {
                    match frame {
                        Some(frame) => {
                            if !self.on_frame(frame).await {
                                break;
                            }
                        }
                        None => {
                            debug!("link closed, halting match");
                            self.driver.handle_event(PeerEvent::PeerLeft);
                            self.flush().await;
                            break;
                        }
                    }
                }
                command = self.commands.recv() => {
                    match command {
                        Some(command) => {
                            self.driver.handle_command(command);
                            self.flush().await;
                        }
                        None => {
                            debug!("presentation side closed, leaving room");
                            let _ = self.frames_out.send(ClientFrame::Leave).await;
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.driver.handle_tick();
                    self.flush().await;
                }
            }

            if self.driver.is_halted() {
                break;
            }
        }
    }

    /// Apply one frame; false means the peer should stop.
    async fn on_frame(&mut self, frame: ServerFrame) -> bool {
        if let Some(event) = frame.to_peer_event() {
            self.driver.handle_event(event);
            self.flush().await;
            return true;
        }
        match frame {
            ServerFrame::Shutdown { reason } => {
                info!(reason, "relay shut down, halting match");
                self.driver.handle_event(PeerEvent::PeerLeft);
                self.flush().await;
                false
            }
            ServerFrame::Error(e) => {
                warn!(code = ?e.code, "relay rejected a frame: {}", e.message);
                true
            }
            _ => true,
        }
    }

    /// Drain driver effects into frames and notifications.
    async fn flush(&mut self) {
        for effect in self.driver.drain_effects() {
            match effect {
                Effect::Notify(note) => {
                    if self.notifications.send(note).await.is_err() {
                        debug!("notification dropped, presentation side closed");
                    }
                }
                effect => {
                    if let Some(frame) = frame_for_effect(&effect) {
                        if self.frames_out.send(frame).await.is_err() {
                            debug!("frame dropped, link closed");
                        }
                    }
                }
            }
        }
    }
}
