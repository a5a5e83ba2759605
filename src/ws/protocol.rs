//! JSON frame protocol for the session gateway.
//!
//! Client → server frames are tagged with `type`; server → client frames
//! are tagged with `event` (bus events are serialized as-is, plus the
//! `subscribed`/`unsubscribed` acks and `error` frames defined here).

use std::collections::HashSet;

use axum::extract::ws::Message;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use crate::db::models::{ConnectionStatus, MessageType};
use crate::error::ApiError;
use crate::participants::{self, registry};
use crate::state::AppState;

fn default_message_type() -> MessageType {
    MessageType::Text
}

/// Frames a client may send over the session connection.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Start receiving this room's broadcasts on this connection.
    Subscribe { room_id: String },
    /// Stop receiving this room's broadcasts.
    Unsubscribe { room_id: String },
    /// Send a chat message; delivery back happens via the room broadcast.
    Chat {
        room_id: String,
        #[serde(rename = "message_type", default = "default_message_type")]
        message_type: MessageType,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        image_ref: Option<String>,
    },
}

/// Handle one incoming text frame: decode, dispatch, reply.
pub async fn handle_text_frame(
    text: &str,
    tx: &mpsc::UnboundedSender<Message>,
    state: &AppState,
    user_id: &str,
    subscribed_rooms: &mut HashSet<String>,
) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(user_id = %user_id, error = %e, "undecodable ws frame");
            send_error_frame(tx, "bad_request", "Invalid frame");
            return;
        }
    };

    match frame {
        ClientFrame::Subscribe { room_id } => {
            match subscribe(state, &room_id, user_id).await {
                Ok(()) => {
                    subscribed_rooms.insert(room_id.clone());
                    send_frame(tx, &json!({ "event": "subscribed", "data": { "room_id": room_id } }));
                }
                Err(e) => send_error_frame(tx, e.code(), &e.to_string()),
            }
        }
        ClientFrame::Unsubscribe { room_id } => {
            subscribed_rooms.remove(&room_id);
            if let Some(mut subscribers) = state.room_subscriptions.get_mut(&room_id) {
                subscribers.remove(user_id);
            }
            send_frame(tx, &json!({ "event": "unsubscribed", "data": { "room_id": room_id } }));
        }
        ClientFrame::Chat {
            room_id,
            message_type,
            content,
            image_ref,
        } => {
            // The durable append publishes on the room topic; the sender
            // sees their own message through the broadcast like everyone
            // else, preserving the total id order.
            if let Err(e) = crate::chat::messages::append_message(
                state, &room_id, user_id, message_type, content, image_ref,
            )
            .await
            {
                send_error_frame(tx, e.code(), &e.to_string());
            }
        }
    }
}

/// Subscribing requires membership: an ACTIVE participant attaches
/// directly, a DISCONNECTED one is reconnected (their seat was held), an
/// EXITED or unknown user is refused.
async fn subscribe(state: &AppState, room_id: &str, user_id: &str) -> Result<(), ApiError> {
    let db = state.db.clone();
    let rid = room_id.to_string();
    let uid = user_id.to_string();

    let status = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| ApiError::internal("db lock poisoned"))?;
        crate::rooms::load_room(&conn, &rid)?;
        Ok::<_, ApiError>(
            registry::get_participant(&conn, &rid, &uid)?.map(|p| p.connection_status),
        )
    })
    .await??;

    match status {
        Some(ConnectionStatus::Active) => {}
        Some(ConnectionStatus::Disconnected) => {
            // Reconnect without a fresh invitation.
            participants::join_room_inner(state, room_id, user_id, false).await?;
        }
        Some(ConnectionStatus::Exited) | None => return Err(ApiError::NotParticipant),
    }

    state
        .room_subscriptions
        .entry(room_id.to_string())
        .or_default()
        .insert(user_id.to_string());

    Ok(())
}

fn send_frame<T: serde::Serialize>(tx: &mpsc::UnboundedSender<Message>, frame: &T) {
    if let Ok(text) = serde_json::to_string(frame) {
        let _ = tx.send(Message::Text(text.into()));
    }
}

fn send_error_frame(tx: &mpsc::UnboundedSender<Message>, code: &str, message: &str) {
    send_frame(
        tx,
        &json!({ "event": "error", "data": { "code": code, "message": message } }),
    );
}
