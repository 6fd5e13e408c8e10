//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{ConnId, PlayerInput};
use crate::room::RoomHandle;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::ClientMsg;

/// WebSocket upgrade handler. Connections are anonymous until they send `start`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let conn_id = Uuid::new_v4();
    debug!(conn_id = %conn_id, "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, conn_id, state.room))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, conn_id: ConnId, room: RoomHandle) {
    info!(conn_id = %conn_id, "New WebSocket connection");

    let outbound_rx = match room.connect(conn_id).await {
        Ok(rx) => rx,
        Err(e) => {
            error!(conn_id = %conn_id, error = %e, "Failed to register connection");
            return;
        }
    };

    let (ws_sink, ws_stream) = socket.split();
    run_session(conn_id, &room, ws_sink, ws_stream, outbound_rx).await;

    // Leaving is implicit on disconnect
    room.disconnect(conn_id).await;

    info!(conn_id = %conn_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    conn_id: ConnId,
    room: &RoomHandle,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
) {
    let rate_limiter = ConnectionRateLimiter::new();

    // Spawn writer task: room frames -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(json) = outbound_rx.recv().await {
            if let Err(e) = ws_sink.send(Message::Text(json)).await {
                debug!(conn_id = %conn_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> room
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(conn_id = %conn_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => {
                        if room.send_input(PlayerInput::new(conn_id, client_msg)).await.is_err() {
                            debug!(conn_id = %conn_id, "Room channel closed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(conn_id = %conn_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(conn_id = %conn_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(conn_id = %conn_id, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(conn_id = %conn_id, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(conn_id = %conn_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}
