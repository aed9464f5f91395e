use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use futures::stream::SplitSink;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::broadcast::{BroadcastSink, Envelope, Room};
use crate::state::AppState;

/// Frames a connected client may send. Anything unparseable is ignored.
#[derive(Deserialize)]
#[serde(tag = "action")]
enum ClientFrame {
    #[serde(rename = "join_notification_room")]
    Join { role: String },
    #[serde(rename = "locationUpdate")]
    LocationUpdate {
        #[serde(flatten)]
        payload: Value,
    },
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut global_rx = state.broadcaster.subscribe_global();
    // Joined lazily when the client declares its role.
    let mut room_rx: Option<Receiver<Envelope>> = None;

    state.metrics.ws_clients.inc();
    info!("websocket client connected");

    loop {
        tokio::select! {
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&state, &text, &mut room_rx);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            event = global_rx.recv() => {
                match event {
                    Ok(envelope) => {
                        if forward(&mut sender, &envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "websocket client lagged behind global events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            event = recv_joined(&mut room_rx) => {
                match event {
                    Ok(envelope) => {
                        if forward(&mut sender, &envelope).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "websocket client lagged behind room events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    state.metrics.ws_clients.dec();
    info!("websocket client disconnected");
}

/// Resolves to the joined room's next event, or stays pending forever when
/// the client has not joined a room yet.
async fn recv_joined(room_rx: &mut Option<Receiver<Envelope>>) -> Result<Envelope, RecvError> {
    match room_rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn handle_frame(state: &Arc<AppState>, text: &str, room_rx: &mut Option<Receiver<Envelope>>) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(_) => return,
    };

    match frame {
        ClientFrame::Join { role } => {
            let room = match role.as_str() {
                "admin" => Room::Admins,
                "deliveryAgent" => Room::DeliveryAgents,
                "customer" => Room::Customers,
                _ => return,
            };
            *room_rx = Some(state.broadcaster.subscribe(room));
        }
        ClientFrame::LocationUpdate { payload } => {
            // Raw passthrough, rebroadcast to everyone.
            state.broadcaster.publish(Room::All, "locationUpdate", payload);
        }
    }
}

async fn forward(
    sender: &mut SplitSink<WebSocket, Message>,
    envelope: &Envelope,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(envelope) {
        Ok(json) => json,
        Err(err) => {
            warn!(error = %err, "failed to serialize event for ws");
            return Ok(());
        }
    };
    sender.send(Message::Text(json.into())).await
}
