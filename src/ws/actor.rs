use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};

use crate::participants;
use crate::state::AppState;
use crate::ws::protocol;
use crate::ws::ConnectionSender;

/// Ping interval: server sends WebSocket ping every 30 seconds.
/// Prevents connection leaks from abrupt disconnects.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader task: processes incoming frames, dispatches to protocol handlers
///
/// The mpsc channel allows any part of the system (the bus relay in
/// particular) to push frames to this client by cloning the sender.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: String) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    register_connection(&state, &user_id, tx.clone());

    tracing::info!(user_id = %user_id, "WebSocket actor started");

    // Rooms this connection subscribed to; reconciled on close.
    let mut subscribed_rooms: HashSet<String> = HashSet::new();

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died — connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {
                    // Pong received, continue
                }
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    // Reader loop: process incoming WebSocket messages
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_text_frame(
                        &text,
                        &tx,
                        &state,
                        &user_id,
                        &mut subscribed_rooms,
                    )
                    .await;
                }
                Message::Binary(_) => {
                    tracing::debug!(
                        user_id = %user_id,
                        "Received binary frame (protocol is JSON text)"
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(user_id = %user_id, reason = ?frame, "Client initiated close");
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(user_id = %user_id, error = %e, "WebSocket receive error");
                break;
            }
            None => {
                tracing::info!(user_id = %user_id, "WebSocket stream ended");
                break;
            }
        }
    }

    // Cleanup: abort writer and ping tasks
    writer_handle.abort();
    ping_handle.abort();

    unregister_connection(&state, &user_id, &tx);

    // If this was the user's last connection, their seats go DISCONNECTED
    // (network loss semantics — the grace sweep or an explicit leave frees
    // them) and the local subscription table forgets them.
    let has_remaining = state
        .connections
        .get(&user_id)
        .map(|v| !v.is_empty())
        .unwrap_or(false);

    if !has_remaining {
        for room_id in &subscribed_rooms {
            if let Some(mut subscribers) = state.room_subscriptions.get_mut(room_id) {
                subscribers.remove(&user_id);
            }
            participants::mark_disconnected(&state, room_id, &user_id).await;
        }
    }

    tracing::info!(user_id = %user_id, "WebSocket actor stopped");
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed — connection is broken
            break;
        }
    }
}

/// Register a connection sender in the connection registry.
fn register_connection(state: &AppState, user_id: &str, tx: ConnectionSender) {
    state
        .connections
        .entry(user_id.to_string())
        .or_default()
        .push(tx);

    let conn_count = state.connections.get(user_id).map(|v| v.len()).unwrap_or(0);
    tracing::debug!(user_id = %user_id, connections = conn_count, "Connection registered");
}

/// Remove this connection's sender (and any already-closed ones) from the
/// registry for a user.
fn unregister_connection(state: &AppState, user_id: &str, tx: &ConnectionSender) {
    let mut remove_user = false;

    if let Some(mut connections) = state.connections.get_mut(user_id) {
        connections.retain(|sender| !sender.same_channel(tx) && !sender.is_closed());
        if connections.is_empty() {
            remove_user = true;
        }
    }

    if remove_user {
        state.connections.remove(user_id);
    }

    tracing::debug!(user_id = %user_id, "Connection unregistered");
}
