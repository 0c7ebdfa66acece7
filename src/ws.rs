//! WebSocket surface and the participant session lifecycle that drives it.
//! Wired through `warp::ws().on_upgrade(...)` in `main.rs`. Frames here are
//! plain single-JSON-object text frames, not a GraphQL-over-WS protocol.

use futures::{SinkExt, StreamExt};
use warp::ws::{Message as WsMessage, WebSocket};
use warp::{Filter, Rejection, Reply};

use crate::ids::{Protocol, RoomId, WorkspaceId};
use crate::message::Message;
use crate::registry::Registry;
use crate::room::RoomHandle;
use crate::session::{self, HandshakeOutcome, SessionHandle};
use crate::FabricError;

pub fn routes(registry: Registry) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let registry = warp::any().map(move || registry.clone());
    warp::path::param::<String>()
        .and_then(|segment: String| async move {
            match segment.as_str() {
                "robotics" => Ok(Protocol::Robotics),
                "video" => Ok(Protocol::Video),
                _ => Err(warp::reject::not_found()),
            }
        })
        .and(warp::path!("workspaces" / String / "rooms" / String / "ws"))
        .and(warp::ws())
        .and(registry)
        .map(
            |protocol: Protocol, workspace_id: String, room_id: String, ws: warp::ws::Ws, registry: Registry| {
                let workspace_id = WorkspaceId::from(workspace_id);
                let room_id = RoomId::from(room_id);
                ws.on_upgrade(move |socket| async move {
                    handle_connection(socket, protocol, workspace_id, room_id, registry).await;
                })
            },
        )
}

async fn handle_connection(
    socket: WebSocket,
    protocol: Protocol,
    workspace_id: WorkspaceId,
    room_id: RoomId,
    registry: Registry,
) {
    let (mut tx, mut rx) = socket.split();

    let room = match registry.get_room(&workspace_id, &room_id) {
        Some(room) => room,
        None => {
            let _ = send_json(
                &mut tx,
                &Message::error(FabricError::UnknownRoom {
                    workspace_id,
                    room_id,
                }
                .reason()),
            )
            .await;
            let _ = tx.close().await;
            return;
        }
    };
    if room.protocol() != protocol {
        let _ = send_json(
            &mut tx,
            &Message::error("room does not belong to this protocol"),
        )
        .await;
        let _ = tx.close().await;
        return;
    }

    // --- handshake: first text frame must be a valid join request ---
    let first_frame = match rx.next().await {
        Some(Ok(frame)) if frame.is_text() => frame.to_str().unwrap_or_default().to_owned(),
        _ => {
            let _ = send_json(&mut tx, &Message::error("expected join request")).await;
            let _ = tx.close().await;
            return;
        }
    };
    let request = match session::handshake(&first_frame) {
        HandshakeOutcome::Joined { request } => request,
        HandshakeOutcome::Reject { reason } => {
            let _ = send_json(&mut tx, &Message::error(reason)).await;
            let _ = tx.close().await;
            return;
        }
    };

    let session = SessionHandle::new(
        request.participant_id.clone(),
        request.role,
        workspace_id,
        room_id,
    );
    if let Err(err) = room.admit(session.clone()).await {
        let _ = send_json(&mut tx, &Message::error(err.reason())).await;
        let _ = tx.close().await;
        return;
    }

    log::debug!(
        "+session {} ({}) in room {}",
        session.id(),
        session.role(),
        session.room_id()
    );

    // Writer task: drains the session's bounded outbound queue onto the socket.
    let writer_session = session.clone();
    let writer = tokio::spawn(async move {
        while let Some(message) = writer_session.recv().await {
            if send_json(&mut tx, &message).await.is_err() {
                writer_session.close();
                break;
            }
        }
        let _ = tx.close().await;
    });

    // Reader loop: decodes inbound frames and forwards them to the room actor.
    reader_loop(&mut rx, &room, &session).await;

    room.evict(session.id().clone()).await;
    session.close();
    let _ = writer.await;
    log::debug!("-session {}", session.id());
}

async fn reader_loop(
    rx: &mut (impl futures::Stream<Item = Result<WsMessage, warp::Error>> + Unpin),
    room: &RoomHandle,
    session: &SessionHandle,
) {
    while let Some(frame) = rx.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!(
                    "{}",
                    FabricError::Transport(format!("session {}: {err}", session.id()))
                );
                break;
            }
        };
        if frame.is_close() {
            break;
        }
        if frame.is_binary() {
            session.send(Message::error("binary frames are not supported"));
            continue;
        }
        let Some(text) = frame.to_str().ok() else {
            continue;
        };
        match serde_json::from_str::<Message>(text) {
            Ok(Message::Heartbeat { .. }) => {
                // Answered synchronously, without touching room state.
                session.send(Message::HeartbeatAck {
                    timestamp: crate::message::now_iso8601(),
                });
            }
            Ok(message) => room.apply(session.id().clone(), message).await,
            Err(err) => {
                log::debug!("decode failure from {}: {err}", session.id());
                session.send(Message::error(format!("malformed message: {err}")));
            }
        }
    }
}

async fn send_json(
    tx: &mut (impl futures::Sink<WsMessage, Error = warp::Error> + Unpin),
    message: &Message,
) -> Result<(), warp::Error> {
    let text = serde_json::to_string(message).expect("Message always serializes");
    tx.send(WsMessage::text(text)).await
}
