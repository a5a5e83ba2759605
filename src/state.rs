use std::sync::Arc;

use crate::bus::FanoutBus;
use crate::config::RoomPolicy;
use crate::db::DbPool;
use crate::reward::RewardSink;
use crate::rooms::locks::RoomLocks;
use crate::ws::{ConnectionRegistry, RoomSubscriptions};

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
    /// Active WebSocket connections per user
    pub connections: ConnectionRegistry,
    /// Which locally-connected users are subscribed to each room topic
    pub room_subscriptions: RoomSubscriptions,
    /// Publish/subscribe fanout bus
    pub bus: FanoutBus,
    /// Per-room exclusive locks serializing status and capacity mutations
    pub room_locks: RoomLocks,
    /// Room capacity / lifecycle policy knobs
    pub policy: RoomPolicy,
    /// External reward collaborator, invoked on room finish
    pub reward: Arc<dyn RewardSink>,
}
