//! Room creation and state queries.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::middleware::Claims;
use crate::db::models::{ConnectionStatus, RoomStatus};
use crate::error::ApiError;
use crate::participants::registry;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub title: String,
    #[serde(default)]
    pub book_ref: Option<String>,
    #[serde(default)]
    pub capacity: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct RoomResponse {
    pub id: String,
    pub host_id: String,
    pub title: String,
    pub book_ref: Option<String>,
    pub status: RoomStatus,
    pub capacity: i64,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct ParticipantResponse {
    pub user_id: String,
    pub connection_status: ConnectionStatus,
    pub joined_at: String,
}

#[derive(Debug, Serialize)]
pub struct RoomStateResponse {
    #[serde(flatten)]
    pub room: RoomResponse,
    pub active_participants: Vec<ParticipantResponse>,
}

/// POST /api/rooms — Create a room. The caller becomes host and is seated
/// as the first ACTIVE participant.
pub async fn create_room(
    State(state): State<AppState>,
    claims: Claims,
    Json(req): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<RoomResponse>), ApiError> {
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }

    let capacity = req
        .capacity
        .unwrap_or(state.policy.default_capacity)
        .clamp(1, state.policy.max_capacity);

    let db = state.db.clone();
    let host_id = claims.sub.clone();
    let book_ref = req.book_ref.clone();

    let room = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| ApiError::internal("db lock poisoned"))?;

        let room_id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO rooms (id, host_id, title, book_ref, status, capacity, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'waiting', ?5, ?6, ?6)",
            rusqlite::params![room_id, host_id, title, book_ref, capacity, now],
        )?;

        // Host occupies the first seat immediately.
        registry::insert_participant(&conn, &room_id, &host_id)?;

        Ok::<_, ApiError>(RoomResponse {
            id: room_id,
            host_id,
            title,
            book_ref,
            status: RoomStatus::Waiting,
            capacity,
            created_at: now,
        })
    })
    .await??;

    tracing::info!(room_id = %room.id, host_id = %room.host_id, "room created");

    Ok((StatusCode::CREATED, Json(room)))
}

/// GET /api/rooms/{room_id} — Current room state plus active participants.
/// Read-accessible to any authenticated user; lock-free snapshot.
pub async fn get_room(
    State(state): State<AppState>,
    _claims: Claims,
    Path(room_id): Path<String>,
) -> Result<Json<RoomStateResponse>, ApiError> {
    let db = state.db.clone();

    let response = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| ApiError::internal("db lock poisoned"))?;

        let room = super::load_room(&conn, &room_id)?;
        let active = registry::list_active(&conn, &room_id)?;

        Ok::<_, ApiError>(RoomStateResponse {
            room: RoomResponse {
                id: room.id,
                host_id: room.host_id,
                title: room.title,
                book_ref: room.book_ref,
                status: room.status,
                capacity: room.capacity,
                created_at: room.created_at,
            },
            active_participants: active
                .into_iter()
                .map(|p| ParticipantResponse {
                    user_id: p.user_id,
                    connection_status: p.connection_status,
                    joined_at: p.joined_at,
                })
                .collect(),
        })
    })
    .await??;

    Ok(Json(response))
}

/// GET /api/rooms/{room_id}/participants — Active participant list.
pub async fn list_participants(
    State(state): State<AppState>,
    _claims: Claims,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<ParticipantResponse>>, ApiError> {
    let db = state.db.clone();

    let participants = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| ApiError::internal("db lock poisoned"))?;

        // 404 for unknown rooms rather than an empty list
        super::load_room(&conn, &room_id)?;

        let active = registry::list_active(&conn, &room_id)?;
        Ok::<_, ApiError>(
            active
                .into_iter()
                .map(|p| ParticipantResponse {
                    user_id: p.user_id,
                    connection_status: p.connection_status,
                    joined_at: p.joined_at,
                })
                .collect::<Vec<_>>(),
        )
    })
    .await??;

    Ok(Json(participants))
}
