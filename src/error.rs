//! Request-scoped error taxonomy for room, participant, invitation and chat
//! operations. Every variant maps to one HTTP status and a stable machine
//! code; none are retried server-side. `Busy` (room lock timeout) is the one
//! callers are expected to retry with backoff.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("illegal room state transition")]
    InvalidTransition,
    #[error("only the room host may perform this operation")]
    NotHost,
    #[error("room is at capacity")]
    RoomFull,
    #[error("room is not joinable")]
    RoomNotJoinable,
    #[error("a pending invitation for this user already exists")]
    DuplicateInvitation,
    #[error("only the invitation receiver may respond")]
    NotReceiver,
    #[error("invitation is no longer pending")]
    InvalidState,
    #[error("sender is not an active participant of this room")]
    NotParticipant,
    #[error("user is banned")]
    BannedUser,
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("room is busy, retry later")]
    Busy,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Stable machine-readable code included in the JSON body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTransition => "invalid_transition",
            Self::NotHost => "not_host",
            Self::RoomFull => "room_full",
            Self::RoomNotJoinable => "room_not_joinable",
            Self::DuplicateInvitation => "duplicate_invitation",
            Self::NotReceiver => "not_receiver",
            Self::InvalidState => "invalid_state",
            Self::NotParticipant => "not_participant",
            Self::BannedUser => "banned_user",
            Self::Busy => "busy",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidTransition
            | Self::RoomFull
            | Self::RoomNotJoinable
            | Self::DuplicateInvitation
            | Self::InvalidState => StatusCode::CONFLICT,
            Self::NotHost
            | Self::NotReceiver
            | Self::NotParticipant
            | Self::BannedUser
            | Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Busy => StatusCode::SERVICE_UNAVAILABLE,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Wrap any displayable error as an internal failure.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, Self::Internal(_)) {
            tracing::error!(error = %self, "request failed");
        }
        let body = Json(json!({
            "error": self.code(),
            "message": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("task join: {err}"))
    }
}
