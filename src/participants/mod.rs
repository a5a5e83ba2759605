//! Participant lifecycle: join, leave, kick, disconnect, reconnect.
//!
//! Capacity and the EXITED/DISCONNECTED distinction live here. Everything
//! that can race against a concurrent join or finish takes the room's
//! exclusive lock; publishes happen after the lock is released.

pub mod registry;
pub mod sweep;

use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::auth::middleware::Claims;
use crate::bus::{RoomEvent, UserEvent};
use crate::db::models::{ConnectionStatus, RoomStatus};
use crate::error::ApiError;
use crate::rooms::crud::ParticipantResponse;
use crate::state::AppState;

/// WebSocket close code sent to kicked users.
pub const CLOSE_KICKED: u16 = 4004;

/// POST /api/rooms/{room_id}/join — Take a seat in the room.
pub async fn join_room(
    State(state): State<AppState>,
    claims: Claims,
    Path(room_id): Path<String>,
) -> Result<Json<ParticipantResponse>, ApiError> {
    let participant = join_room_inner(&state, &room_id, &claims.sub, false).await?;

    Ok(Json(ParticipantResponse {
        user_id: participant.user_id,
        connection_status: participant.connection_status,
        joined_at: participant.joined_at,
    }))
}

/// Shared join path for bare joins and invitation acceptance.
/// Takes the room lock so the capacity check and the insert are one atomic
/// step with respect to concurrent joiners and a concurrent finish.
pub async fn join_room_inner(
    state: &AppState,
    room_id: &str,
    user_id: &str,
    via_invitation: bool,
) -> Result<crate::db::models::Participant, ApiError> {
    let lock_timeout = Duration::from_secs(state.policy.lock_timeout_secs);
    let guard = state.room_locks.acquire(room_id, lock_timeout).await?;

    let db = state.db.clone();
    let policy = state.policy.clone();
    let rid = room_id.to_string();
    let uid = user_id.to_string();

    let (participant, newly_active) = tokio::task::spawn_blocking(move || {
        let mut conn = db.lock().map_err(|_| ApiError::internal("db lock poisoned"))?;
        let tx = conn.transaction()?;
        let outcome = registry::join_room_tx(&tx, &policy, &rid, &uid, via_invitation)?;
        tx.commit()?;
        Ok::<_, ApiError>(outcome)
    })
    .await??;

    drop(guard);

    if newly_active {
        tracing::info!(room_id = %room_id, user_id = %user_id, "participant joined");
        state.bus.publish_room(
            room_id,
            RoomEvent::ParticipantJoined {
                room_id: room_id.to_string(),
                user_id: user_id.to_string(),
            },
        );
    }

    Ok(participant)
}

/// POST /api/rooms/{room_id}/leave — Voluntary exit. Frees the seat, no
/// auto-reconnect, idempotent if already EXITED. Conservatively takes the
/// room lock so the freed seat is never double-counted against a racing join.
pub async fn leave_room(
    State(state): State<AppState>,
    claims: Claims,
    Path(room_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let lock_timeout = Duration::from_secs(state.policy.lock_timeout_secs);
    let guard = state.room_locks.acquire(&room_id, lock_timeout).await?;

    let db = state.db.clone();
    let rid = room_id.clone();
    let uid = claims.sub.clone();

    let changed = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| ApiError::internal("db lock poisoned"))?;

        // A finished room is a closed audit record: the participant rows
        // freeze as they stood at the moment of finish.
        let room = crate::rooms::load_room(&conn, &rid)?;
        if room.status == RoomStatus::Finished {
            return Err(ApiError::RoomNotJoinable);
        }

        let participant = registry::get_participant(&conn, &rid, &uid)?
            .ok_or(ApiError::NotFound("participant"))?;
        if participant.connection_status == ConnectionStatus::Exited {
            return Ok::<_, ApiError>(false);
        }
        registry::set_status(&conn, &rid, &uid, ConnectionStatus::Exited)?;
        Ok(true)
    })
    .await??;

    drop(guard);

    if changed {
        tracing::info!(room_id = %room_id, user_id = %claims.sub, "participant left");
        state.bus.publish_room(
            &room_id,
            RoomEvent::ParticipantLeft {
                room_id: room_id.clone(),
                user_id: claims.sub.clone(),
            },
        );
    }

    Ok(Json(serde_json::json!({ "left": true })))
}

#[derive(Debug, Deserialize)]
pub struct KickRequest {
    pub user_id: String,
}

/// POST /api/rooms/{room_id}/kick — Host-only forced removal. The target is
/// EXITED (seat freed) and a forced-disconnect event goes out on their user
/// topic so every instance terminates their live connections.
pub async fn kick_participant(
    State(state): State<AppState>,
    claims: Claims,
    Path(room_id): Path<String>,
    Json(req): Json<KickRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.user_id == claims.sub {
        return Err(ApiError::BadRequest("host cannot kick themselves".to_string()));
    }

    let lock_timeout = Duration::from_secs(state.policy.lock_timeout_secs);
    let guard = state.room_locks.acquire(&room_id, lock_timeout).await?;

    let db = state.db.clone();
    let rid = room_id.clone();
    let caller = claims.sub.clone();
    let target = req.user_id.clone();

    tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| ApiError::internal("db lock poisoned"))?;

        let room = crate::rooms::load_room(&conn, &rid)?;
        if room.host_id != caller {
            return Err(ApiError::NotHost);
        }
        if room.status == RoomStatus::Finished {
            return Err(ApiError::RoomNotJoinable);
        }

        registry::get_participant(&conn, &rid, &target)?
            .ok_or(ApiError::NotFound("participant"))?;
        registry::set_status(&conn, &rid, &target, ConnectionStatus::Exited)?;
        Ok::<_, ApiError>(())
    })
    .await??;

    drop(guard);

    tracing::info!(room_id = %room_id, user_id = %req.user_id, "participant kicked");

    state.bus.publish_room(
        &room_id,
        RoomEvent::ParticipantKicked {
            room_id: room_id.clone(),
            user_id: req.user_id.clone(),
        },
    );
    state.bus.publish_user(
        &req.user_id,
        UserEvent::ForceDisconnect {
            reason: "You have been removed from this reading room".to_string(),
            close_code: CLOSE_KICKED,
        },
    );

    Ok(Json(serde_json::json!({ "kicked": true })))
}

/// Mark an ACTIVE participant DISCONNECTED (network-level loss). The seat
/// stays reserved until the grace-period sweep or an explicit leave. Called
/// from the WebSocket actor when a user's last connection drops.
pub async fn mark_disconnected(state: &AppState, room_id: &str, user_id: &str) {
    let lock_timeout = Duration::from_secs(state.policy.lock_timeout_secs);
    let guard = match state.room_locks.acquire(room_id, lock_timeout).await {
        Ok(guard) => guard,
        Err(_) => {
            // The sweep will reconcile; losing this marker only delays the
            // seat release.
            tracing::warn!(room_id = %room_id, user_id = %user_id, "skipping disconnect marker, room busy");
            return;
        }
    };

    let db = state.db.clone();
    let rid = room_id.to_string();
    let uid = user_id.to_string();

    let result = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| ApiError::internal("db lock poisoned"))?;

        // After finish the who-was-present snapshot must not drift.
        let room = crate::rooms::load_room(&conn, &rid)?;
        if room.status == RoomStatus::Finished {
            return Ok::<_, ApiError>(false);
        }

        let participant = registry::get_participant(&conn, &rid, &uid)?;
        match participant {
            Some(p) if p.connection_status == ConnectionStatus::Active => {
                registry::set_status(&conn, &rid, &uid, ConnectionStatus::Disconnected)?;
                Ok::<_, ApiError>(true)
            }
            _ => Ok(false),
        }
    })
    .await;

    drop(guard);

    match result {
        Ok(Ok(true)) => {
            tracing::info!(room_id = %room_id, user_id = %user_id, "participant disconnected");
            state.bus.publish_room(
                room_id,
                RoomEvent::ParticipantDisconnected {
                    room_id: room_id.to_string(),
                    user_id: user_id.to_string(),
                },
            );
        }
        Ok(Ok(false)) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "disconnect marker failed"),
        Err(e) => tracing::error!(error = %e, "disconnect marker task join failed"),
    }
}
