use axum::{middleware, routing::get, routing::post, Router};

use crate::auth::middleware::JwtSecret;
use crate::chat::messages as chat_messages;
use crate::identity;
use crate::invites::{respond as invite_respond, send as invite_send};
use crate::moderation::{ban, kick};
use crate::participants;
use crate::rooms::{crud as room_crud, lifecycle};
use crate::state::AppState;
use crate::ws::handler as ws_handler;

/// Inject the JWT secret into request extensions so the Claims extractor can find it.
async fn inject_jwt_secret(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> axum::response::Response {
    req.extensions_mut()
        .insert(JwtSecret(state.jwt_secret.clone()));
    next.run(req).await
}

/// Build the full axum Router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Identity (stand-in for the external session issuer)
        .route("/api/identity/register", post(identity::register))
        // Rooms: creation, state, playback control
        .route("/api/rooms", post(room_crud::create_room))
        .route("/api/rooms/{room_id}", get(room_crud::get_room))
        .route("/api/rooms/{room_id}/start", post(lifecycle::start_room))
        .route("/api/rooms/{room_id}/pause", post(lifecycle::pause_room))
        .route("/api/rooms/{room_id}/finish", post(lifecycle::finish_room))
        // Participants
        .route("/api/rooms/{room_id}/join", post(participants::join_room))
        .route("/api/rooms/{room_id}/leave", post(participants::leave_room))
        .route(
            "/api/rooms/{room_id}/kick",
            post(participants::kick_participant),
        )
        .route(
            "/api/rooms/{room_id}/participants",
            get(room_crud::list_participants),
        )
        // Invitations
        .route("/api/rooms/{room_id}/invites", post(invite_send::send_invite))
        .route("/api/invites", get(invite_send::list_my_invites))
        .route(
            "/api/invites/{invitation_id}/respond",
            post(invite_respond::respond_invite),
        )
        // Chat
        .route(
            "/api/rooms/{room_id}/messages",
            post(chat_messages::send_message).get(chat_messages::get_history),
        )
        // Moderation (admin)
        .route("/api/moderation/ban", post(ban::ban_user))
        .route("/api/moderation/kick", post(kick::platform_kick))
        // Real-time session gateway
        .route("/ws", get(ws_handler::ws_upgrade))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            inject_jwt_secret,
        ))
        .with_state(state)
}
