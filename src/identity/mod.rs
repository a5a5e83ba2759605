//! Thin stand-in for the external identity/session collaborator.
//!
//! Real account management lives elsewhere; this module only mints the user
//! rows and access tokens the room core needs to be bootable and testable.
//! The first registered user receives the platform admin flag.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::token;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub display_name: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: String,
    pub display_name: String,
    pub is_admin: bool,
    pub token: String,
}

/// POST /api/identity/register — Create a user and issue an access token.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let display_name = req.display_name.trim().to_string();
    if display_name.is_empty() || display_name.len() > 64 {
        return Err(ApiError::BadRequest(
            "display_name must be 1-64 characters".to_string(),
        ));
    }

    let db = state.db.clone();
    let name = display_name.clone();

    let (user_id, is_admin) = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| ApiError::internal("db lock poisoned"))?;

        let user_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        let is_admin = user_count == 0;

        let user_id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();

        let inserted = conn.execute(
            "INSERT INTO users (id, display_name, is_admin, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![user_id, name, is_admin, now],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(ApiError::BadRequest("display_name already taken".to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        Ok::<_, ApiError>((user_id, is_admin))
    })
    .await??;

    let token = token::issue_access_token(&state.jwt_secret, &user_id, is_admin)
        .map_err(ApiError::internal)?;

    tracing::info!(user_id = %user_id, is_admin, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            display_name,
            is_admin,
            token,
        }),
    ))
}
