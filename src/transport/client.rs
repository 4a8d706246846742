//! Relay Client
//!
//! Connects to a battle relay, joins a room, and exposes the socket as
//! a pair of frame channels.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error};

use crate::battle::player::Seat;
use crate::transport::protocol::{ClientFrame, ServerFrame};
use crate::transport::RoomId;

/// Client errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Connection failed.
    #[error("Connect failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    /// The relay refused the join.
    #[error("Join rejected: {0}")]
    JoinRejected(String),

    /// Connection closed during the handshake.
    #[error("Connection closed during handshake")]
    ConnectionClosed,

    /// Malformed traffic during the handshake.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// A joined relay connection.
///
/// The match seed arrives in-stream as a `MatchReady` frame once an
/// opponent shows up; until then `frames_in` simply waits.
pub struct RelayClient {
    /// Room identifier.
    pub room_id: RoomId,
    /// Room name (assigned if the join was unnamed).
    pub room: String,
    /// The seat this peer occupies.
    pub seat: Seat,
    /// Whether this peer owns shared room state.
    pub authority: bool,
    /// Frames toward the relay.
    pub frames_out: mpsc::Sender<ClientFrame>,
    /// Frames from the relay. Closes when the connection dies.
    pub frames_in: mpsc::Receiver<ServerFrame>,
}

impl RelayClient {
    /// Connect to a relay and join a room.
    ///
    /// `room` of `None` joins any open room, or opens a fresh one.
    pub async fn connect(url: &str, room: Option<String>) -> Result<Self, ClientError> {
        let (ws_stream, _) = connect_async(url).await?;
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        let join = ClientFrame::Join { room };
        let text = join
            .to_json()
            .map_err(|e| ClientError::Protocol(e.to_string()))?;
        ws_sender.send(Message::Text(text)).await?;

        let (room_id, room, seat, authority) = loop {
            match ws_receiver.next().await {
                Some(Ok(Message::Text(text))) => {
                    match ServerFrame::from_json(&text) {
                        Ok(ServerFrame::Joined { room_id, room, seat, authority }) => {
                            break (room_id, room, seat, authority);
                        }
                        Ok(ServerFrame::Error(e)) => {
                            return Err(ClientError::JoinRejected(e.message));
                        }
                        Ok(other) => {
                            debug!("Ignoring pre-join frame: {:?}", other);
                        }
                        Err(e) => return Err(ClientError::Protocol(e.to_string())),
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Err(ClientError::ConnectionClosed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(ClientError::Connect(e)),
            }
        };

        debug!(%room_id, ?seat, authority, "joined room");

        let (in_tx, in_rx) = mpsc::channel::<ServerFrame>(64);
        let (out_tx, mut out_rx) = mpsc::channel::<ClientFrame>(64);

        // Serialize outgoing frames onto the socket.
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let text = match frame.to_json() {
                    Ok(t) => t,
                    Err(e) => {
                        error!("Failed to serialize frame: {}", e);
                        continue;
                    }
                };
                if ws_sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = ws_sender.send(Message::Close(None)).await;
        });

        // Parse incoming frames off the socket. Dropping `in_tx` closes
        // `frames_in`, which is how the shell learns the link is gone.
        tokio::spawn(async move {
            while let Some(msg) = ws_receiver.next().await {
                match msg {
                    Ok(Message::Text(text)) => match ServerFrame::from_json(&text) {
                        Ok(frame) => {
                            if in_tx.send(frame).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => debug!("Ignoring malformed frame: {}", e),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!("WebSocket error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            room_id,
            room,
            seat,
            authority,
            frames_out: out_tx,
            frames_in: in_rx,
        })
    }
}
