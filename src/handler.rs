//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, join
//! parameter validation, presence notifications, relaying inbound envelopes
//! to the room, and the leave sequence on disconnect.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::member::Member;
use crate::message::{Inbound, PresenceData};
use crate::params::{JoinParams, MISSING_PARAMETERS_REASON};
use crate::registry::{Departure, RoomRegistry};
use crate::types::ConnectionId;

/// How long a rejected client gets to acknowledge the close frame
const REJECT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, registers the member and runs the
/// connection until either side goes away. The member leaves its room
/// exactly once, whichever way the connection ends.
pub async fn handle_connection(
    stream: TcpStream,
    registry: Arc<RoomRegistry>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake, keeping the request query for the join parameters
    let mut query: Option<String> = None;
    let mut ws_stream = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        query = req.uri().query().map(str::to_owned);
        Ok::<_, ErrorResponse>(resp)
    })
    .await?;

    let params = match JoinParams::from_query(query.as_deref()) {
        Ok(params) => params,
        Err(e) => {
            warn!("Rejecting connection from {}: {}", peer_addr, e);
            reject(&mut ws_stream).await?;
            return Ok(());
        }
    };

    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let member = Member::new(
        ConnectionId::new(),
        params.user_id,
        params.user_name,
        params.room_id,
        frame_tx,
    );

    info!(
        "User {} ({}) joined folder {}",
        member.user_name, member.user_id, member.room_id
    );
    // Announces the joiner and queues its snapshot as its first frame
    let joined = registry.join(member.clone()).await;
    if joined.is_ok() {
        run_session(&registry, &member, ws_stream, frame_rx).await;
    }

    depart(&registry, &member).await;

    joined.map(|_| ())
}

/// Close a connection whose join parameters are incomplete
async fn reject(ws_stream: &mut WebSocketStream<TcpStream>) -> Result<(), AppError> {
    ws_stream
        .close(Some(CloseFrame {
            code: CloseCode::Policy,
            reason: MISSING_PARAMETERS_REASON.into(),
        }))
        .await?;

    // Drain until the peer acknowledges the close
    let drain = async { while let Some(Ok(_)) = ws_stream.next().await {} };
    if tokio::time::timeout(REJECT_CLOSE_TIMEOUT, drain).await.is_err() {
        debug!("Rejected client did not acknowledge close in time");
    }
    Ok(())
}

/// Pump frames both ways until either side of the connection ends
async fn run_session(
    registry: &Arc<RoomRegistry>,
    member: &Member,
    ws_stream: WebSocketStream<TcpStream>,
    mut frame_rx: mpsc::UnboundedReceiver<Arc<str>>,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Spawn read task (WebSocket -> room)
    let read_registry = registry.clone();
    let read_member = member.clone();
    let mut read_task = tokio::spawn(async move {
        let mut close_frame = None;
        while let Some(msg_result) = ws_receiver.next().await {
            match msg_result {
                Ok(Message::Text(text)) => {
                    relay_inbound(&read_registry, &read_member, &text).await;
                }
                Ok(Message::Close(frame)) => {
                    // Keep reading so tungstenite can flush the close reply
                    close_frame = frame;
                }
                Ok(Message::Ping(_)) => {
                    // Pong is handled automatically by tungstenite
                    debug!("Ping from {}", read_member.user_id);
                }
                Ok(Message::Pong(_)) => {
                    debug!("Pong from {}", read_member.user_id);
                }
                Ok(_) => {
                    // Binary or raw frames - ignore
                }
                Err(e) => {
                    error!(
                        "WebSocket error for {} in folder {}: {}",
                        read_member.user_name, read_member.room_id, e
                    );
                    break;
                }
            }
        }
        close_frame
    });

    // Spawn write task (member channel -> WebSocket)
    let mut write_task = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if let Err(e) = ws_sender.send(Message::Text(frame.to_string().into())).await {
                debug!("WebSocket send failed, ending write task: {}", e);
                break;
            }
        }

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Wait for either task to complete
    tokio::select! {
        closed = &mut read_task => {
            match closed.ok().flatten() {
                Some(frame) => info!(
                    "User {} left folder {} (code: {}, reason: {})",
                    member.user_name, member.room_id, u16::from(frame.code), frame.reason
                ),
                None => info!(
                    "User {} left folder {} (no close frame)",
                    member.user_name, member.room_id
                ),
            }
        }
        _ = &mut write_task => {
            info!(
                "User {} left folder {} (connection lost)",
                member.user_name, member.room_id
            );
        }
    }

    read_task.abort();
    write_task.abort();
}

/// Relay one inbound text frame to the rest of the room
///
/// Malformed payloads are logged and dropped; the connection stays open.
/// Well-formed ones go out exactly as received.
async fn relay_inbound(registry: &RoomRegistry, member: &Member, text: &str) {
    let inbound = match Inbound::parse(text) {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!("Error parsing message from {}: {}", member.user_id, e);
            return;
        }
    };

    debug!(
        "Received message: {} from {}",
        inbound.kind(),
        member.user_name
    );

    let delivered = registry
        .broadcast_frame(&member.room_id, inbound.frame(), &member.user_id)
        .await;
    debug!("Relayed {} to {} members", inbound.kind(), delivered);
}

/// Remove the member from its room and tell whoever remains
async fn depart(registry: &RoomRegistry, member: &Member) {
    match registry.leave(member).await {
        Departure::Remaining(remaining) => {
            debug!(
                "{} members remain in folder {}",
                remaining, member.room_id
            );
            if let Err(e) = registry
                .broadcast(
                    &member.room_id,
                    &member.presence(PresenceData::Left),
                    &member.user_id,
                )
                .await
            {
                error!("Failed to announce departure of {}: {}", member.user_id, e);
            }
        }
        Departure::RoomClosed => {
            debug!("Folder {} is now empty", member.room_id);
        }
        Departure::NotMember => {
            debug!("User {} already left folder {}", member.user_id, member.room_id);
        }
    }
}
