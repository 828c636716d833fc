//! The websocket endpoint. Every connection gets two tasks: one pumping parsed
//! inbound envelopes into the engine actor, one pumping outbound messages back
//! over the socket. If either side finishes, the other is aborted and the actor
//! is told about the disconnect.

use crate::AppState;
use crate::actor::Command;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use protocol::{CHANNEL_BUFFER_SIZE, ClientMessage, ServerMessage};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;

/// This function gets immediately called and upgrades the web response to a web socket.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| websocket(socket, state))
}

/// Does the whole handling from attach to detach.
async fn websocket(stream: WebSocket, state: Arc<AppState>) {
    let conn_id = state.next_conn_id.fetch_add(1, Ordering::Relaxed);
    // By splitting, we can send and receive at the same time.
    let (sender, receiver) = stream.split();

    let (out_tx, out_rx) = mpsc::channel::<ServerMessage>(CHANNEL_BUFFER_SIZE);
    if state
        .commands
        .send(Command::Attach { conn_id, sender: out_tx })
        .await
        .is_err()
    {
        tracing::error!("Engine actor gone, refusing the connection.");
        return;
    }

    let mut send_task = tokio::spawn(send_loop(sender, out_rx));
    let commands = state.commands.clone();
    let mut receive_task = tokio::spawn(receive_loop(receiver, commands, conn_id));

    // If any one of the tasks runs to completion, we abort the other.
    tokio::select! {
        _ = &mut send_task => { receive_task.abort(); }
        _ = &mut receive_task => { send_task.abort(); }
    }

    let _ = state.commands.send(Command::Detach { conn_id }).await;
    tracing::debug!(conn_id, "Connection closed.");
}

/// Serializes outbound messages onto the socket until either end goes away.
async fn send_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::Receiver<ServerMessage>,
) {
    while let Some(message) = out_rx.recv().await {
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(err) => {
                tracing::error!(?err, "Failed to serialize an outbound message.");
                continue;
            }
        };
        if sender.send(Message::Text(text.into())).await.is_err() {
            return;
        }
    }
}

/// Parses inbound frames and forwards them to the actor. Malformed envelopes
/// are dropped with a log line; they never reach the engine.
async fn receive_loop(
    mut receiver: SplitStream<WebSocket>,
    commands: mpsc::Sender<Command>,
    conn_id: u64,
) {
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let message: ClientMessage = match serde_json::from_str(text.as_str()) {
                    Ok(message) => message,
                    Err(err) => {
                        tracing::debug!(conn_id, ?err, "Ignoring malformed client envelope.");
                        continue;
                    }
                };
                if commands
                    .send(Command::Message { conn_id, message })
                    .await
                    .is_err()
                {
                    return;
                }
            }
            Ok(Message::Close(_)) => return,
            // Ping pong and binary frames carry nothing for us.
            Ok(_) => {}
            Err(_) => return,
        }
    }
}
