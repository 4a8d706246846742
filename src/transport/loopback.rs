//! In-Process Loopback Transport
//!
//! Wires two peers to one in-memory room router, no sockets involved.
//! Frames take the exact path they would through the relay, ordered
//! fan-out and writer validation included, which makes this the
//! harness of choice for demos and end-to-end tests.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::debug;

use crate::battle::player::Seat;
use crate::transport::protocol::{ClientFrame, FrameError, ServerFrame};
use crate::transport::session::{RoomConfig, RoomError, RoomSession};
use crate::transport::{MatchHandshake, PeerId, RoomId};

/// One peer's end of a loopback pair.
pub struct LoopbackLink {
    /// Seat, authority and seed for the local driver.
    pub handshake: MatchHandshake,
    /// Frames toward the room router.
    pub frames_out: mpsc::Sender<ClientFrame>,
    /// Frames from the room router.
    pub frames_in: mpsc::Receiver<ServerFrame>,
}

/// Build a full two-peer room and its router task.
///
/// Both links start with `Joined` and `MatchReady` already queued, the
/// same frames a relay client would see.
pub async fn loopback_pair() -> Result<(LoopbackLink, LoopbackLink), RoomError> {
    let room_id = RoomId::new_random();
    let mut room = RoomSession::new(
        room_id,
        "loopback".to_string(),
        RoomConfig::default(),
        Utc::now(),
    );

    let (host_in_tx, host_in_rx) = mpsc::channel::<ServerFrame>(64);
    let (guest_in_tx, guest_in_rx) = mpsc::channel::<ServerFrame>(64);
    let (host_out_tx, mut host_out_rx) = mpsc::channel::<ClientFrame>(64);
    let (guest_out_tx, mut guest_out_rx) = mpsc::channel::<ClientFrame>(64);

    let host_id = PeerId::new_random();
    let guest_id = PeerId::new_random();

    let (_, first) = room.join(host_id, host_in_tx)?;
    let (_, second) = room.join(guest_id, guest_in_tx)?;

    let mut match_seed = 0u64;
    for (_, frame) in first.iter().chain(second.iter()) {
        if let ServerFrame::MatchReady { match_seed: seed } = frame {
            match_seed = *seed;
        }
    }

    room.deliver(first).await;
    room.deliver(second).await;

    tokio::spawn(async move {
        let mut sweep = interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                frame = host_out_rx.recv() => {
                    if on_frame(&mut room, Seat::Host, host_id, frame).await {
                        break;
                    }
                }
                frame = guest_out_rx.recv() => {
                    if on_frame(&mut room, Seat::Guest, guest_id, frame).await {
                        break;
                    }
                }
                _ = sweep.tick() => {
                    let deliveries = room.sweep(Utc::now());
                    room.deliver(deliveries).await;
                }
            }
        }
    });

    let handshake = |seat: Seat| MatchHandshake {
        room_id,
        room: "loopback".to_string(),
        seat,
        authority: seat == RoomSession::authority_seat(),
        match_seed,
    };

    Ok((
        LoopbackLink {
            handshake: handshake(Seat::Host),
            frames_out: host_out_tx,
            frames_in: host_in_rx,
        },
        LoopbackLink {
            handshake: handshake(Seat::Guest),
            frames_out: guest_out_tx,
            frames_in: guest_in_rx,
        },
    ))
}

/// Route one frame; true means the room is done and the router stops.
async fn on_frame(
    room: &mut RoomSession,
    from: Seat,
    peer_id: PeerId,
    frame: Option<ClientFrame>,
) -> bool {
    match frame {
        Some(ClientFrame::Leave) | None => {
            let deliveries = room.mark_left(peer_id);
            room.deliver(deliveries).await;
            true
        }
        Some(frame) => {
            match room.route(from, frame, Utc::now()) {
                Ok(deliveries) => room.deliver(deliveries).await,
                Err(e) => {
                    debug!(?from, "loopback rejected frame: {}", e);
                    let reply = ServerFrame::Error(FrameError {
                        code: e.code(),
                        message: e.to_string(),
                    });
                    room.deliver(vec![(from, reply)]).await;
                }
            }
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::player::PlayerProp;

    #[tokio::test]
    async fn test_loopback_pair_shares_one_seed() {
        let (host, guest) = loopback_pair().await.unwrap();

        assert_eq!(host.handshake.seat, Seat::Host);
        assert_eq!(guest.handshake.seat, Seat::Guest);
        assert!(host.handshake.authority);
        assert!(!guest.handshake.authority);
        assert_eq!(host.handshake.match_seed, guest.handshake.match_seed);
    }

    #[tokio::test]
    async fn test_loopback_starts_with_handshake_frames() {
        let (mut host, _guest) = loopback_pair().await.unwrap();

        assert!(matches!(
            host.frames_in.recv().await,
            Some(ServerFrame::Joined { seat: Seat::Host, authority: true, .. })
        ));
        assert!(matches!(
            host.frames_in.recv().await,
            Some(ServerFrame::MatchReady { .. })
        ));
    }

    #[tokio::test]
    async fn test_loopback_routes_to_both_ends() {
        let (mut host, mut guest) = loopback_pair().await.unwrap();
        for rx in [&mut host.frames_in, &mut guest.frames_in] {
            rx.recv().await;
            rx.recv().await;
        }

        host.frames_out
            .send(ClientFrame::SetPlayerProp {
                seat: Seat::Host,
                prop: PlayerProp::IsFieldCardPlaced(true),
            })
            .await
            .unwrap();

        let expected = ServerFrame::PlayerProperty {
            seat: Seat::Host,
            prop: PlayerProp::IsFieldCardPlaced(true),
        };
        assert_eq!(host.frames_in.recv().await, Some(expected.clone()));
        assert_eq!(guest.frames_in.recv().await, Some(expected));
    }

    #[tokio::test]
    async fn test_loopback_announces_departure() {
        let (host, mut guest) = loopback_pair().await.unwrap();
        guest.frames_in.recv().await;
        guest.frames_in.recv().await;

        drop(host);

        assert_eq!(
            guest.frames_in.recv().await,
            Some(ServerFrame::PeerLeft { seat: Seat::Host })
        );
    }
}
