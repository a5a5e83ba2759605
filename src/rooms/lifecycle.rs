//! The room state machine: WAITING → PLAYING ↔ PAUSED → FINISHED.
//!
//! Every transition is a host-only, read-check-write sequence serialized by
//! the room's exclusive lock and committed in a single transaction. `finish`
//! atomically flips the status, snapshots the ACTIVE participants for the
//! reward collaborator, and expires every PENDING invitation — either all of
//! it commits or none of it does. Bus publishes and the reward call happen
//! after commit, outside the lock, and never roll the transition back.

use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::Serialize;

use crate::auth::middleware::Claims;
use crate::bus::RoomEvent;
use crate::db::models::RoomStatus;
use crate::error::ApiError;
use crate::invites;
use crate::participants::registry;
use crate::reward::RoomFinishedEvent;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub room_id: String,
    pub status: RoomStatus,
}

/// POST /api/rooms/{room_id}/start — WAITING or PAUSED → PLAYING.
pub async fn start_room(
    State(state): State<AppState>,
    claims: Claims,
    Path(room_id): Path<String>,
) -> Result<Json<TransitionResponse>, ApiError> {
    transition(state, room_id, claims.sub, RoomStatus::Playing).await
}

/// POST /api/rooms/{room_id}/pause — PLAYING → PAUSED.
pub async fn pause_room(
    State(state): State<AppState>,
    claims: Claims,
    Path(room_id): Path<String>,
) -> Result<Json<TransitionResponse>, ApiError> {
    transition(state, room_id, claims.sub, RoomStatus::Paused).await
}

/// POST /api/rooms/{room_id}/finish — any non-terminal state → FINISHED.
pub async fn finish_room(
    State(state): State<AppState>,
    claims: Claims,
    Path(room_id): Path<String>,
) -> Result<Json<TransitionResponse>, ApiError> {
    transition(state, room_id, claims.sub, RoomStatus::Finished).await
}

async fn transition(
    state: AppState,
    room_id: String,
    caller: String,
    target: RoomStatus,
) -> Result<Json<TransitionResponse>, ApiError> {
    let lock_timeout = Duration::from_secs(state.policy.lock_timeout_secs);
    let guard = state.room_locks.acquire(&room_id, lock_timeout).await?;

    let db = state.db.clone();
    let rid = room_id.clone();

    let finished = tokio::task::spawn_blocking(move || {
        let mut conn = db.lock().map_err(|_| ApiError::internal("db lock poisoned"))?;
        let tx = conn.transaction()?;

        let room = super::load_room(&tx, &rid)?;
        if room.host_id != caller {
            return Err(ApiError::NotHost);
        }
        if !room.status.can_transition_to(target) {
            return Err(ApiError::InvalidTransition);
        }

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "UPDATE rooms SET status = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![rid, target.as_str(), now],
        )?;

        // Finish side effects ride the same transaction as the status flip:
        // no invitation expiry without the flip, and vice versa.
        let finished = if target == RoomStatus::Finished {
            let active = registry::list_active(&tx, &rid)?;
            invites::expire_all_for_room(&tx, &rid)?;
            Some(RoomFinishedEvent {
                room_id: rid.clone(),
                participant_ids: active.into_iter().map(|p| p.user_id).collect(),
            })
        } else {
            None
        };

        tx.commit()?;
        Ok::<_, ApiError>(finished)
    })
    .await??;

    // Publishes and the reward call happen outside the critical section.
    drop(guard);

    tracing::info!(room_id = %room_id, status = target.as_str(), "room transition");

    state.bus.publish_room(
        &room_id,
        RoomEvent::RoomStateChanged {
            room_id: room_id.clone(),
            status: target,
        },
    );

    if let Some(event) = finished {
        state
            .bus
            .publish_room(&room_id, event.clone().into_room_event());
        if let Err(e) = state.reward.room_finished(&event) {
            // Best-effort: the room is already FINISHED.
            tracing::error!(room_id = %room_id, error = %e, "reward sink failed");
        }
    }

    Ok(Json(TransitionResponse {
        room_id,
        status: target,
    }))
}
