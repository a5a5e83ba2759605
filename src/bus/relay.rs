//! The per-process bus subscriber.
//!
//! Every server instance runs exactly one relay task. It receives every bus
//! message and rebroadcasts to the clients connected to THIS process: room
//! events go to the users locally subscribed to that room, user events go
//! straight to that user's connections. This is what lets the set of
//! WebSocket-holding processes scale horizontally behind one logical room.
//!
//! Delivery is best-effort: a lagged receiver drops messages (clients
//! recover via history/state re-fetch) and send failures are ignored.

use tokio::sync::broadcast::error::RecvError;

use crate::bus::{BusMessage, RoomEvent, UserEvent};
use crate::state::AppState;
use crate::ws::broadcast::{force_close_user, send_to_user};

/// Spawn the relay task for this process.
pub fn spawn_relay(state: AppState) {
    let mut rx = state.bus.subscribe();

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => route(&state, &msg),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "bus relay lagged, dropped messages");
                }
                Err(RecvError::Closed) => {
                    tracing::info!("bus closed, relay stopping");
                    break;
                }
            }
        }
    });
}

fn route(state: &AppState, msg: &BusMessage) {
    match msg {
        BusMessage::Room(room_id, event) => {
            // Snapshot the subscriber set so no DashMap guard is held while
            // sending.
            let subscribers: Vec<String> = state
                .room_subscriptions
                .get(room_id)
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default();

            for user_id in &subscribers {
                send_to_user(&state.connections, user_id, event);
            }

            // Local subscription upkeep: exited users stop receiving room
            // broadcasts, and a finished room's topic empties out.
            match event {
                RoomEvent::ParticipantLeft { user_id, .. }
                | RoomEvent::ParticipantKicked { user_id, .. } => {
                    if let Some(mut subscribers) = state.room_subscriptions.get_mut(room_id) {
                        subscribers.remove(user_id);
                    }
                }
                RoomEvent::RoomFinished { .. } => {
                    state.room_subscriptions.remove(room_id);
                }
                _ => {}
            }
        }
        BusMessage::User(user_id, event) => {
            send_to_user(&state.connections, user_id, event);

            if let UserEvent::ForceDisconnect { reason, close_code } = event {
                force_close_user(&state.connections, user_id, *close_code, reason);
            }
        }
    }
}
