//! Database row types and status enums for the reading room schema.
//! These correspond 1:1 to the SQLite tables defined in migrations.rs.

use serde::{Deserialize, Serialize};

/// Room playback status. Stored lowercase in the rooms.status column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Waiting,
    Playing,
    Paused,
    Finished,
}

impl RoomStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "playing" => Some(Self::Playing),
            "paused" => Some(Self::Paused),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Finished => "finished",
        }
    }

    /// Legal transitions: WAITING→PLAYING, PLAYING↔PAUSED, any non-terminal
    /// state →FINISHED. FINISHED is absorbing.
    pub fn can_transition_to(&self, next: RoomStatus) -> bool {
        match (self, next) {
            (Self::Finished, _) => false,
            (Self::Waiting, Self::Playing) => true,
            (Self::Playing, Self::Paused) => true,
            (Self::Paused, Self::Playing) => true,
            (_, Self::Finished) => true,
            _ => false,
        }
    }
}

/// Participant connection status within a room.
///
/// EXITED left voluntarily (or was kicked): seat freed, no rebroadcast.
/// DISCONNECTED lost the network: seat is still reserved until the grace
/// period sweep converts it to EXITED, and the user may reconnect without
/// a fresh invitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Active,
    Exited,
    Disconnected,
}

impl ConnectionStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "exited" => Some(Self::Exited),
            "disconnected" => Some(Self::Disconnected),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Exited => "exited",
            Self::Disconnected => "disconnected",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl InvitationStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    System,
}

impl MessageType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::System => "system",
        }
    }
}

/// User record in the users table
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub is_admin: bool,
    pub created_at: String,
}

/// Room record in the rooms table
#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub host_id: String,
    pub title: String,
    pub book_ref: Option<String>,
    pub status: RoomStatus,
    pub capacity: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Participant membership record. Never physically deleted.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: String,
    pub room_id: String,
    pub user_id: String,
    pub connection_status: ConnectionStatus,
    pub joined_at: String,
    pub disconnected_at: Option<String>,
}

/// Invitation record in the room_invitations table
#[derive(Debug, Clone)]
pub struct Invitation {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub status: InvitationStatus,
    pub created_at: String,
    pub responded_at: Option<String>,
}

/// Chat message row. The integer id is the pagination cursor.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: i64,
    pub room_id: String,
    pub sender_id: String,
    pub message_type: MessageType,
    pub content: Option<String>,
    pub image_ref: Option<String>,
    pub created_at: String,
}
