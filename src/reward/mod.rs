//! Reward collaborator interface.
//!
//! When a room finishes, the participants who were ACTIVE at that instant
//! are credited experience by an external subsystem. The room core only owns
//! the typed event and the delivery call; a sink failure is logged and never
//! rolls back the finish transition.

use crate::bus::RoomEvent;

/// Emitted exactly once per room, at the moment it transitions to FINISHED.
#[derive(Debug, Clone)]
pub struct RoomFinishedEvent {
    pub room_id: String,
    /// Users whose connection status was ACTIVE when the room finished.
    pub participant_ids: Vec<String>,
}

impl RoomFinishedEvent {
    pub fn into_room_event(self) -> RoomEvent {
        RoomEvent::RoomFinished {
            room_id: self.room_id,
            participant_ids: self.participant_ids,
        }
    }
}

/// Narrow interface to the external reward/EXP collaborator.
pub trait RewardSink: Send + Sync {
    /// Deliver a room-finished event. Errors are the sink's to report; the
    /// caller only logs them.
    fn room_finished(&self, event: &RoomFinishedEvent) -> Result<(), String>;
}

/// Default sink: records the event in the log. Stands in for the real
/// collaborator in single-node deployments and tests.
pub struct LogRewardSink;

impl RewardSink for LogRewardSink {
    fn room_finished(&self, event: &RoomFinishedEvent) -> Result<(), String> {
        tracing::info!(
            room_id = %event.room_id,
            participants = event.participant_ids.len(),
            "room finished, crediting active participants"
        );
        Ok(())
    }
}
