use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;

use crate::auth::middleware::Claims;
use crate::bus::UserEvent;
use crate::error::ApiError;
use crate::participants::CLOSE_KICKED;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PlatformKickRequest {
    pub user_id: String,
    #[serde(default)]
    pub reason: String,
}

/// POST /api/moderation/kick — Admin-only platform-wide forced logout.
///
/// Publishes a force-disconnect on the target's user topic; every instance
/// forwards it to that user's live connections and closes them. Independent
/// of room membership.
pub async fn platform_kick(
    State(state): State<AppState>,
    claims: Claims,
    Json(req): Json<PlatformKickRequest>,
) -> Result<StatusCode, ApiError> {
    if !claims.is_admin {
        return Err(ApiError::Forbidden("admin privileges required"));
    }

    let reason = if req.reason.is_empty() {
        "Your session has been terminated by a moderator".to_string()
    } else {
        req.reason.clone()
    };

    tracing::info!(user_id = %req.user_id, "platform kick issued");

    state
        .bus
        .publish_user(
            &req.user_id,
            UserEvent::ForceDisconnect {
                reason,
                close_code: CLOSE_KICKED,
            },
        );

    Ok(StatusCode::OK)
}
