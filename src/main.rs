//! Triad Duel Server
//!
//! Relay server and demo harness for synchronized two-player card
//! battles.

use std::env;

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use triad_duel::{
    battle::driver::{MatchConfig, PlayerCommand},
    battle::events::Notification,
    battle::room::BattlePhase,
    transport::{loopback_pair, BattleRelay, MatchPeer, PeerHandle, RelayConfig},
    CardType, COUNTDOWN_SECS, MAX_ROUNDS, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    info!("Triad Duel Server v{}", VERSION);
    info!("Rounds per match: {}", MAX_ROUNDS);
    info!("Selection countdown: {} seconds", COUNTDOWN_SECS);

    match env::args().nth(1).as_deref() {
        Some("serve") => {
            let mut config = RelayConfig::default();
            if let Some(addr) = env::args().nth(2) {
                config.bind_addr = addr.parse()?;
            }
            let relay = BattleRelay::new(config);
            relay.run().await?;
            Ok(())
        }
        Some("demo") | None => demo_match().await,
        Some(other) => {
            anyhow::bail!("unknown command {other:?}, expected \"serve\" or \"demo\"")
        }
    }
}

/// Demo function: two scripted players over a loopback room.
async fn demo_match() -> anyhow::Result<()> {
    info!("=== Starting Demo Match ===");

    let (host_link, guest_link) = loopback_pair().await?;
    info!("Room: {}", host_link.handshake.room);
    info!("Match seed: {}", host_link.handshake.match_seed);

    let config = MatchConfig::default();
    let (host_peer, host_handle) = MatchPeer::over_link(config, host_link);
    let (guest_peer, guest_handle) = MatchPeer::over_link(config, guest_link);
    tokio::spawn(host_peer.run());
    tokio::spawn(guest_peer.run());

    // Host spends its skill on round 1 and wins the match 3:1.
    let host = tokio::spawn(demo_player(
        "host",
        host_handle,
        [CardType::Brave, CardType::Princess, CardType::Devil],
        Some(1),
    ));
    let guest = tokio::spawn(demo_player(
        "guest",
        guest_handle,
        [CardType::Devil, CardType::Devil, CardType::Princess],
        None,
    ));

    let host_end = host.await?;
    let guest_end = guest.await?;

    info!("=== Match Results ===");
    match (host_end, guest_end) {
        (
            Some(Notification::MatchEnded { outcome, own_points, opponent_points }),
            Some(Notification::MatchEnded {
                own_points: guest_points,
                opponent_points: guest_sees_host,
                ..
            }),
        ) => {
            info!("Host: {:?} ({}:{})", outcome, own_points, opponent_points);
            if own_points == guest_sees_host && opponent_points == guest_points {
                info!("CONSISTENCY VERIFIED: Both peers agree on the score");
            } else {
                info!("CONSISTENCY FAILURE: Peers disagree on the score");
            }
        }
        _ => info!("Demo ended without a result"),
    }

    Ok(())
}

/// A scripted player: places one card per round, optionally spends the
/// skill, and narrates what it sees.
async fn demo_player(
    name: &'static str,
    mut handle: PeerHandle,
    picks: [CardType; 3],
    skill_round: Option<u32>,
) -> Option<Notification> {
    let mut round: u32 = 0;
    while let Some(note) = handle.notifications.recv().await {
        match note {
            Notification::RoundStarted { round: r, max_rounds } => {
                round = r;
                info!("[{}] Round {}/{}", name, r, max_rounds);
            }
            Notification::TurnChanged { holder } => {
                info!("[{}] Initiative: {:?}", name, holder);
            }
            Notification::PhaseChanged { phase: BattlePhase::Selection } => {
                if skill_round == Some(round) {
                    info!("[{}] Activating skill", name);
                    handle.commands.send(PlayerCommand::ActivateSkill).await.ok()?;
                }
                let card = picks[round.saturating_sub(1).min(2) as usize];
                info!("[{}] Playing {:?}", name, card);
                handle.commands.send(PlayerCommand::PlaceCard(card)).await.ok()?;
            }
            Notification::CountdownTick { remaining_secs } if remaining_secs <= 3 => {
                info!("[{}] {} seconds left", name, remaining_secs);
            }
            Notification::RoundJudged {
                own_card,
                opponent_card,
                judgement,
                points_gained,
                own_points,
                opponent_points,
            } => {
                info!(
                    "[{}] {:?} vs {:?}: {:?} (+{}), score {}:{}",
                    name, own_card, opponent_card, judgement,
                    points_gained, own_points, opponent_points,
                );
            }
            ended @ Notification::MatchEnded { .. } => {
                info!("[{}] Match over", name);
                return Some(ended);
            }
            Notification::OpponentLeft => {
                info!("[{}] Opponent left", name);
                return None;
            }
            _ => {}
        }
    }
    None
}
