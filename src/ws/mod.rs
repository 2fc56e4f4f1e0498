pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use handlers::ConnCtx;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut ctx = ConnCtx::new();
    tracing::info!(conn = %ctx.conn_id, "websocket connected");

    // Room broadcast subscription, set once the connection claims or joins
    // a room. Joining a different room swaps it out.
    let mut room_rx: Option<broadcast::Receiver<ServerMessage>> = None;

    loop {
        tokio::select! {
            // Room broadcasts
            room_msg = async {
                match &mut room_rx {
                    Some(rx) => loop {
                        match rx.recv().await {
                            Ok(msg) => break Some(msg),
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                tracing::warn!("room broadcast lagged by {}", n);
                            }
                            Err(broadcast::error::RecvError::Closed) => break None,
                        }
                    },
                    None => {
                        // Not in a room yet: wait forever
                        std::future::pending::<Option<ServerMessage>>().await
                    }
                }
            } => {
                match room_msg {
                    Some(msg) => {
                        if let Ok(json) = serde_json::to_string(&msg) {
                            if sender.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    // The room was dropped by the sweeper; detach
                    None => room_rx = None,
                }
            }

            // Client messages
            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!(conn = %ctx.conn_id, "received: {}", text);

                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                let outcome =
                                    handlers::handle_message(&state, &mut ctx, client_msg).await;
                                if outcome.drop_subscription {
                                    room_rx = None;
                                }
                                if let Some(rx) = outcome.subscription {
                                    room_rx = Some(rx);
                                }
                                for reply in outcome.replies {
                                    if let Ok(json) = serde_json::to_string(&reply) {
                                        if sender.send(Message::Text(json.into())).await.is_err() {
                                            tracing::error!("failed to send reply");
                                            break;
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::error!("failed to parse client message: {}", e);
                                let error = ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                };
                                if let Ok(json) = serde_json::to_string(&error) {
                                    let _ = sender.send(Message::Text(json.into())).await;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!(conn = %ctx.conn_id, "websocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("websocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    handlers::handle_disconnect(&state, &ctx).await;
    tracing::info!(conn = %ctx.conn_id, "websocket connection closed");
}
