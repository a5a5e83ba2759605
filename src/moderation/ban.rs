use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Deserialize;

use crate::auth::middleware::Claims;
use crate::bus::UserEvent;
use crate::error::ApiError;
use crate::moderation::CLOSE_BANNED;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BanRequest {
    pub user_id: String,
    #[serde(default)]
    pub reason: String,
    /// RFC3339; empty means permanent.
    #[serde(default)]
    pub expires_at: String,
}

/// POST /api/moderation/ban — Admin-only. Records the sanction consumed by
/// `assert_not_banned` and force-disconnects the target everywhere.
pub async fn ban_user(
    State(state): State<AppState>,
    claims: Claims,
    Json(req): Json<BanRequest>,
) -> Result<StatusCode, ApiError> {
    if !claims.is_admin {
        return Err(ApiError::Forbidden("admin privileges required"));
    }
    if req.user_id == claims.sub {
        return Err(ApiError::BadRequest("cannot ban yourself".to_string()));
    }

    let db = state.db.clone();
    let target = req.user_id.clone();
    let reason = req.reason.clone();
    let expires_at = req.expires_at.clone();

    tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| ApiError::internal("db lock poisoned"))?;

        let exists: bool = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE id = ?1",
            [&target],
            |row| row.get::<_, i64>(0).map(|c| c > 0),
        )?;
        if !exists {
            return Err(ApiError::NotFound("user"));
        }

        let exp = if expires_at.is_empty() {
            None
        } else {
            Some(expires_at.as_str())
        };
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT OR REPLACE INTO bans (user_id, reason, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![target, reason, exp, now],
        )?;

        Ok::<_, ApiError>(())
    })
    .await??;

    let close_reason = if req.reason.is_empty() {
        "You have been banned".to_string()
    } else {
        format!("Banned: {}", req.reason)
    };

    tracing::info!(user_id = %req.user_id, "user banned");

    state
        .bus
        .publish_user(
            &req.user_id,
            UserEvent::ForceDisconnect {
                reason: close_reason,
                close_code: CLOSE_BANNED,
            },
        );

    Ok(StatusCode::OK)
}
