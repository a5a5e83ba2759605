pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// Connection registry: tracks all active WebSocket connections per user.
/// A user can have multiple concurrent connections (multiple devices/tabs).
/// Arc<DashMap<UserId, Vec<ConnectionSender>>>
pub type ConnectionRegistry = Arc<DashMap<String, Vec<ConnectionSender>>>;

/// Local room subscriptions: which of this process's connected users are
/// subscribed to each room topic. The bus relay consults this to decide
/// which local connections receive a room broadcast.
/// Arc<DashMap<RoomId, HashSet<UserId>>>
pub type RoomSubscriptions = Arc<DashMap<String, HashSet<String>>>;

/// Create a new empty connection registry.
pub fn new_connection_registry() -> ConnectionRegistry {
    Arc::new(DashMap::new())
}

/// Create a new empty room subscription table.
pub fn new_room_subscriptions() -> RoomSubscriptions {
    Arc::new(DashMap::new())
}
