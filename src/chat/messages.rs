//! Durable chat log: append-only per-room messages with cursor pagination.
//!
//! The integer message id is assigned at write time under the store's write
//! serialization, so within a room the id order is the total message order.
//! `recent` and `before` page over the same index in the same direction and
//! therefore never show gaps or duplicates across concurrent inserts.
//!
//! The append path is deliberately lock-free with respect to the room lock:
//! validation reads the room status without it, and a finish that commits
//! immediately after validation simply means the message landed just before
//! the room closed.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Claims;
use crate::bus::{MessageBroadcast, RoomEvent};
use crate::db::models::{ConnectionStatus, MessageType, RoomStatus};
use crate::error::ApiError;
use crate::moderation;
use crate::participants::registry;
use crate::state::AppState;

/// Maximum message content length (bytes).
const MAX_CONTENT_LENGTH: usize = 4000;
/// Default page size for message history.
const DEFAULT_LIMIT: u32 = 50;
/// Maximum page size for message history.
const MAX_LIMIT: u32 = 100;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub image_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Return messages with id strictly below this cursor.
    pub before: Option<i64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Descending id order (newest first).
    pub messages: Vec<MessageBroadcast>,
    pub has_more: bool,
}

/// Append a message to a room's durable log and publish it on the room
/// topic. Shared by the REST handler and the WebSocket chat path.
///
/// Payload rule: TEXT carries content, IMAGE carries an image_ref supplied
/// by the external media collaborator, SYSTEM carries neither.
pub async fn append_message(
    state: &AppState,
    room_id: &str,
    sender_id: &str,
    message_type: MessageType,
    content: Option<String>,
    image_ref: Option<String>,
) -> Result<MessageBroadcast, ApiError> {
    let content = content.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());

    match message_type {
        MessageType::Text => {
            if content.is_none() || image_ref.is_some() {
                return Err(ApiError::BadRequest(
                    "text messages carry content and no image_ref".to_string(),
                ));
            }
        }
        MessageType::Image => {
            if image_ref.is_none() || content.is_some() {
                return Err(ApiError::BadRequest(
                    "image messages carry an image_ref and no content".to_string(),
                ));
            }
        }
        MessageType::System => {
            if content.is_some() || image_ref.is_some() {
                return Err(ApiError::BadRequest(
                    "system messages carry neither content nor image_ref".to_string(),
                ));
            }
        }
    }
    if let Some(ref c) = content {
        if c.len() > MAX_CONTENT_LENGTH {
            return Err(ApiError::BadRequest("message content too long".to_string()));
        }
    }

    let db = state.db.clone();
    let rid = room_id.to_string();
    let uid = sender_id.to_string();

    let message = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| ApiError::internal("db lock poisoned"))?;

        moderation::assert_not_banned(&conn, &uid)?;

        let room = crate::rooms::load_room(&conn, &rid)?;
        if room.status == RoomStatus::Finished {
            return Err(ApiError::RoomNotJoinable);
        }

        let is_active = registry::get_participant(&conn, &rid, &uid)?
            .map(|p| p.connection_status == ConnectionStatus::Active)
            .unwrap_or(false);
        if !is_active {
            return Err(ApiError::NotParticipant);
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO chat_messages (room_id, sender_id, message_type, content, image_ref, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![rid, uid, message_type.as_str(), content, image_ref, now],
        )?;
        let id = conn.last_insert_rowid();

        Ok::<_, ApiError>(MessageBroadcast {
            id,
            room_id: rid,
            sender_id: uid,
            message_type,
            content,
            image_ref,
            created_at: now,
        })
    })
    .await??;

    // Durable write committed; fanout is fire-and-forget from here.
    state
        .bus
        .publish_room(room_id, RoomEvent::MessageCreated(message.clone()));

    Ok(message)
}

/// POST /api/rooms/{room_id}/messages — Send a chat message.
pub async fn send_message(
    State(state): State<AppState>,
    claims: Claims,
    Path(room_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageBroadcast>), ApiError> {
    let message = append_message(
        &state,
        &room_id,
        &claims.sub,
        req.message_type,
        req.content,
        req.image_ref,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/rooms/{room_id}/messages?before=&limit= — History page.
/// Without `before`: the most recent page. With it: backward scroll.
pub async fn get_history(
    State(state): State<AppState>,
    _claims: Claims,
    Path(room_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as i64;
    let before = query.before;

    let db = state.db.clone();
    let rid = room_id.clone();

    let response = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| ApiError::internal("db lock poisoned"))?;

        crate::rooms::load_room(&conn, &rid)?;

        // Fetch one extra row to learn whether an older page exists.
        let mut stmt = conn.prepare(
            "SELECT id, room_id, sender_id, message_type, content, image_ref, created_at
             FROM chat_messages
             WHERE room_id = ?1 AND (?2 IS NULL OR id < ?2)
             ORDER BY id DESC
             LIMIT ?3",
        )?;
        let mut messages: Vec<MessageBroadcast> = stmt
            .query_map(rusqlite::params![rid, before, limit + 1], |row| {
                Ok(MessageBroadcast {
                    id: row.get(0)?,
                    room_id: row.get(1)?,
                    sender_id: row.get(2)?,
                    message_type: MessageType::from_str(&row.get::<_, String>(3)?)
                        .unwrap_or(MessageType::System),
                    content: row.get(4)?,
                    image_ref: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let has_more = messages.len() as i64 > limit;
        if has_more {
            messages.truncate(limit as usize);
        }

        Ok::<_, ApiError>(HistoryResponse { messages, has_more })
    })
    .await??;

    Ok(Json(response))
}
