use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::state::AppState;
use crate::ws::connection::{close_reason, Connection, ConnectionId, ConnectionIo, InboundQuota};
use crate::ws::hub::HubHandle;

#[derive(Debug, Default, Deserialize)]
pub struct RoomQuery {
    room: Option<String>,
}

/// Picks the room for a connection: the `room` query parameter, else the
/// request path without its leading slash, else `default_room`.
pub fn resolve_room_id(query_room: Option<&str>, path: &str, default_room: &str) -> String {
    let from_path = path.strip_prefix('/').unwrap_or(path);
    [query_room.unwrap_or(""), from_path]
        .into_iter()
        .map(str::trim)
        .find(|candidate| !candidate.is_empty())
        .unwrap_or(default_room)
        .to_string()
}

/// WebSocket handler, mounted as the router fallback so any path can name a
/// room.
pub async fn websocket_handler(
    ws: Option<WebSocketUpgrade>,
    uri: Uri,
    query: Option<Query<RoomQuery>>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let Some(ws) = ws else {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    };

    let query_room = query.as_ref().and_then(|Query(q)| q.room.as_deref());
    let room_id = resolve_room_id(query_room, uri.path(), &state.config.default_room);
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown origin");
    info!("New connection to room: {} from {}", room_id, origin);

    let hub = state.hub.clone();
    let outbound_buffer = state.config.outbound_buffer;
    let quota = InboundQuota::new(state.config.inbound_buffer);
    ws.max_frame_size(state.config.max_frame_bytes)
        .max_message_size(state.config.max_frame_bytes)
        .on_failed_upgrade(|e| warn!("WebSocket upgrade failed: {}", e))
        .on_upgrade(move |socket| handle_socket(socket, room_id, hub, outbound_buffer, quota))
}

/// Makes sure the hub hears about the connection going away, however the
/// socket tasks end.
struct LeaveOnDrop {
    hub: HubHandle,
    conn_id: ConnectionId,
}

impl Drop for LeaveOnDrop {
    fn drop(&mut self) {
        self.hub.leave(self.conn_id);
    }
}

/// Handle WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    room_id: String,
    hub: HubHandle,
    outbound_buffer: usize,
    quota: InboundQuota,
) {
    let (connection, io) = Connection::open(outbound_buffer);
    let conn_id = connection.id;
    info!("WebSocket connection established for room: {} with connection_id: {}", room_id, conn_id);

    if !hub.join(&room_id, connection) {
        error!("Relay hub is not running, dropping connection {}", conn_id);
        return;
    }
    let _leave = LeaveOnDrop {
        hub: hub.clone(),
        conn_id,
    };

    let (mut sender, mut receiver) = socket.split();
    let ConnectionIo { mut frames, mut kill } = io;

    // Drain the outbound queue until the hub evicts us or the peer goes away
    let mut send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                Ok(code) = &mut kill => {
                    let frame = CloseFrame {
                        code,
                        reason: close_reason(code).into(),
                    };
                    let _ = sender.send(Message::Close(Some(frame))).await;
                    break;
                }
                frame = frames.recv() => match frame {
                    Some(frame) => {
                        if sender.send(Message::Binary(frame)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    });

    // Forward inbound frames to the hub in the order they arrive
    let frame_hub = hub.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Binary(data)) => {
                    if quota.available() == 0 {
                        debug!("Inbound quota of {} exhausted, pausing reads", conn_id);
                    }
                    let Some(permit) = quota.acquire().await else {
                        break;
                    };
                    if !frame_hub.frame(conn_id, data, permit) {
                        break;
                    }
                }
                Ok(Message::Text(_)) => debug!("Ignoring text message from {}", conn_id),
                Ok(Message::Close(frame)) => {
                    debug!("Close received from {}: {:?}", conn_id, frame);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Transport error on {}: {}", conn_id, e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };
    info!("Connection closed for room: {} ({})", room_id, conn_id);
}
