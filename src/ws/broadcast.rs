//! Helpers for pushing frames to locally-connected clients. All sends are
//! best-effort: a closed channel just means that connection is going away.

use serde::Serialize;

use super::ConnectionRegistry;

/// Serialize a frame and send it to all of a user's live connections.
pub fn send_to_user<T: Serialize>(registry: &ConnectionRegistry, user_id: &str, frame: &T) {
    let text = match serde_json::to_string(frame) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "failed to serialize ws frame");
            return;
        }
    };
    let msg = axum::extract::ws::Message::Text(text.into());

    if let Some(connections) = registry.get(user_id) {
        for sender in connections.value().iter() {
            let _ = sender.send(msg.clone());
        }
    }
}

/// Force-close all connections for a user (kick/ban).
/// Sends a WebSocket Close frame with the given code and reason.
pub fn force_close_user(
    registry: &ConnectionRegistry,
    user_id: &str,
    close_code: u16,
    reason: &str,
) {
    if let Some(connections) = registry.get(user_id) {
        let close_frame = axum::extract::ws::CloseFrame {
            code: close_code,
            reason: reason.into(),
        };
        for sender in connections.value().iter() {
            let _ = sender.send(axum::extract::ws::Message::Close(Some(close_frame.clone())));
        }
    }
}
