use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::middleware::Claims;
use crate::bus::{InvitationBroadcast, UserEvent};
use crate::db::models::{InvitationStatus, RoomStatus};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SendInviteRequest {
    pub receiver_id: String,
}

#[derive(Debug, Serialize)]
pub struct InvitationResponse {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub status: InvitationStatus,
    pub created_at: String,
}

/// POST /api/rooms/{room_id}/invites — Offer a user a seat.
/// At most one PENDING invitation per (room, receiver); the partial unique
/// index backs the check, so concurrent duplicate sends cannot both land.
pub async fn send_invite(
    State(state): State<AppState>,
    claims: Claims,
    Path(room_id): Path<String>,
    Json(req): Json<SendInviteRequest>,
) -> Result<(StatusCode, Json<InvitationResponse>), ApiError> {
    if req.receiver_id == claims.sub {
        return Err(ApiError::BadRequest("cannot invite yourself".to_string()));
    }

    let db = state.db.clone();
    let rid = room_id.clone();
    let sender_id = claims.sub.clone();
    let receiver_id = req.receiver_id.clone();

    let invitation = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| ApiError::internal("db lock poisoned"))?;

        let room = crate::rooms::load_room(&conn, &rid)?;
        if room.status == RoomStatus::Finished {
            return Err(ApiError::RoomNotJoinable);
        }

        let receiver_exists: bool = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE id = ?1",
            [&receiver_id],
            |row| row.get::<_, i64>(0).map(|c| c > 0),
        )?;
        if !receiver_exists {
            return Err(ApiError::NotFound("user"));
        }

        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();

        let inserted = conn.execute(
            "INSERT INTO room_invitations (id, room_id, sender_id, receiver_id, status, created_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
            rusqlite::params![id, rid, sender_id, receiver_id, now],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(ApiError::DuplicateInvitation);
            }
            Err(e) => return Err(e.into()),
        }

        Ok::<_, ApiError>(InvitationResponse {
            id,
            room_id: rid,
            sender_id,
            receiver_id,
            status: InvitationStatus::Pending,
            created_at: now,
        })
    })
    .await??;

    tracing::info!(
        invitation_id = %invitation.id,
        room_id = %room_id,
        receiver_id = %invitation.receiver_id,
        "invitation sent"
    );

    // Direct notification on the receiver's user topic.
    state.bus.publish_user(
        &invitation.receiver_id,
        UserEvent::Invited(InvitationBroadcast {
            id: invitation.id.clone(),
            room_id: invitation.room_id.clone(),
            sender_id: invitation.sender_id.clone(),
            receiver_id: invitation.receiver_id.clone(),
        }),
    );

    Ok((StatusCode::CREATED, Json(invitation)))
}

/// GET /api/invites — The caller's pending invitations.
pub async fn list_my_invites(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Vec<InvitationResponse>>, ApiError> {
    let db = state.db.clone();
    let uid = claims.sub.clone();

    let invites = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| ApiError::internal("db lock poisoned"))?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM room_invitations
             WHERE receiver_id = ?1 AND status = 'pending'
             ORDER BY created_at DESC",
            super::INVITATION_COLS
        ))?;
        let invites = stmt
            .query_map([&uid], |row| super::row_to_invitation(row))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok::<_, ApiError>(
            invites
                .into_iter()
                .map(|inv| InvitationResponse {
                    id: inv.id,
                    room_id: inv.room_id,
                    sender_id: inv.sender_id,
                    receiver_id: inv.receiver_id,
                    status: inv.status,
                    created_at: inv.created_at,
                })
                .collect::<Vec<_>>(),
        )
    })
    .await??;

    Ok(Json(invites))
}
