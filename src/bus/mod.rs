//! Fanout bus: publish/subscribe layer decoupling durable writes from
//! real-time delivery.
//!
//! Two topic families: one per room (chat and room-state broadcasts) and one
//! per user (direct control events such as forced disconnect). Delivery is
//! at-most-once and best-effort — a failed publish or a lagged subscriber is
//! logged and dropped, never surfaced to the caller whose durable write
//! already committed. Clients that miss a push recover by re-querying
//! history or room state.
//!
//! This process-local implementation rides a single `tokio::sync::broadcast`
//! channel; every server instance runs one relay subscriber (see relay.rs)
//! that rebroadcasts to its locally-connected clients. An external broker
//! with the same topic/at-most-once semantics can replace it for multi-node
//! deployments.

pub mod relay;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::db::models::RoomStatus;

/// Capacity of the broadcast channel. Slow receivers that fall behind will
/// skip messages (RecvError::Lagged).
const BUS_CAPACITY: usize = 4096;

/// Chat message payload carried on a room topic.
#[derive(Debug, Clone, Serialize)]
pub struct MessageBroadcast {
    pub id: i64,
    pub room_id: String,
    pub sender_id: String,
    pub message_type: crate::db::models::MessageType,
    pub content: Option<String>,
    pub image_ref: Option<String>,
    pub created_at: String,
}

/// Invitation payload carried on a user topic.
#[derive(Debug, Clone, Serialize)]
pub struct InvitationBroadcast {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub receiver_id: String,
}

/// Events broadcast on room topics.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RoomEvent {
    RoomStateChanged {
        room_id: String,
        status: RoomStatus,
    },
    MessageCreated(MessageBroadcast),
    ParticipantJoined {
        room_id: String,
        user_id: String,
    },
    ParticipantLeft {
        room_id: String,
        user_id: String,
    },
    ParticipantKicked {
        room_id: String,
        user_id: String,
    },
    ParticipantDisconnected {
        room_id: String,
        user_id: String,
    },
    RoomFinished {
        room_id: String,
        participant_ids: Vec<String>,
    },
}

/// Events broadcast on user topics.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum UserEvent {
    Invited(InvitationBroadcast),
    InvitationAnswered {
        invitation_id: String,
        room_id: String,
        receiver_id: String,
        accepted: bool,
    },
    /// Instructs the session gateway to terminate every live connection of
    /// this user (kick from a room, or platform-wide moderation action).
    /// `close_code` becomes the WebSocket close code (4003 ban, 4004 kick).
    ForceDisconnect {
        reason: String,
        close_code: u16,
    },
}

/// One message on the bus: the topic it is addressed to (room:{id} or
/// user:{id}) plus the event payload.
#[derive(Debug, Clone)]
pub enum BusMessage {
    Room(String, RoomEvent),
    User(String, UserEvent),
}

/// The fanout bus handle. Cloneable — stored in AppState.
#[derive(Clone)]
pub struct FanoutBus {
    sender: broadcast::Sender<Arc<BusMessage>>,
}

impl FanoutBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    /// Subscribe to the bus. The relay task calls this once per process.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BusMessage>> {
        self.sender.subscribe()
    }

    /// Publish an event on a room topic. Fire-and-forget: a send error only
    /// means there are no subscribers.
    pub fn publish_room(&self, room_id: &str, event: RoomEvent) {
        if self
            .sender
            .send(Arc::new(BusMessage::Room(room_id.to_string(), event)))
            .is_err()
        {
            tracing::debug!(room_id = %room_id, "bus publish with no subscribers");
        }
    }

    /// Publish an event on a user topic. Fire-and-forget.
    pub fn publish_user(&self, user_id: &str, event: UserEvent) {
        if self
            .sender
            .send(Arc::new(BusMessage::User(user_id.to_string(), event)))
            .is_err()
        {
            tracing::debug!(user_id = %user_id, "bus publish with no subscribers");
        }
    }
}

impl Default for FanoutBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = FanoutBus::new();
        let mut rx = bus.subscribe();

        bus.publish_room(
            "room-1",
            RoomEvent::ParticipantJoined {
                room_id: "room-1".to_string(),
                user_id: "user-1".to_string(),
            },
        );

        let msg = rx.recv().await.unwrap();
        match &*msg {
            BusMessage::Room(room_id, RoomEvent::ParticipantJoined { user_id, .. }) => {
                assert_eq!(room_id, "room-1");
                assert_eq!(user_id, "user-1");
            }
            other => panic!("unexpected bus message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_swallowed() {
        let bus = FanoutBus::new();
        // No receiver — must not panic or error out.
        bus.publish_user(
            "user-1",
            UserEvent::ForceDisconnect {
                reason: "test".to_string(),
                close_code: 4004,
            },
        );
    }
}
