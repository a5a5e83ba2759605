use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::auth::middleware::Claims;
use crate::bus::UserEvent;
use crate::db::models::{Invitation, InvitationStatus};
use crate::error::ApiError;
use crate::moderation;
use crate::participants;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub accept: bool,
}

/// POST /api/invites/{invitation_id}/respond — Accept or reject.
///
/// Only the receiver may respond, only while PENDING, and a sanctioned user
/// may not accept. The PENDING→answered flip is a conditional UPDATE, so two
/// concurrent responses (or a response racing finish-expiry) resolve to
/// exactly one winner.
pub async fn respond_invite(
    State(state): State<AppState>,
    claims: Claims,
    Path(invitation_id): Path<String>,
    Json(req): Json<RespondRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let db = state.db.clone();
    let iid = invitation_id.clone();
    let caller = claims.sub.clone();
    let accept = req.accept;

    let invitation: Invitation = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| ApiError::internal("db lock poisoned"))?;

        let invitation = conn
            .query_row(
                &format!(
                    "SELECT {} FROM room_invitations WHERE id = ?1",
                    super::INVITATION_COLS
                ),
                [&iid],
                |row| super::row_to_invitation(row),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => ApiError::NotFound("invitation"),
                other => ApiError::from(other),
            })?;

        if invitation.receiver_id != caller {
            return Err(ApiError::NotReceiver);
        }
        if invitation.status != InvitationStatus::Pending {
            return Err(ApiError::InvalidState);
        }
        if accept {
            moderation::assert_not_banned(&conn, &caller)?;
        }

        // Claim the invitation; zero rows means someone else answered it or
        // the room finished and expired it in the meantime.
        let target = if accept { "accepted" } else { "rejected" };
        let now = Utc::now().to_rfc3339();
        let claimed = conn.execute(
            "UPDATE room_invitations SET status = ?2, responded_at = ?3
             WHERE id = ?1 AND status = 'pending'",
            rusqlite::params![iid, target, now],
        )?;
        if claimed == 0 {
            return Err(ApiError::InvalidState);
        }

        Ok::<_, ApiError>(invitation)
    })
    .await??;

    if accept {
        let joined =
            participants::join_room_inner(&state, &invitation.room_id, &claims.sub, true).await;

        if let Err(join_err) = joined {
            // Undo the claim so the seat offer is not silently consumed:
            // back to pending on a transient failure, expired if the room
            // finished underneath us. Reopening is guarded against the
            // one-PENDING-per-(room, receiver) index — if a fresh offer was
            // sent while the claim was held, this one expires instead.
            let reopen = !matches!(join_err, ApiError::RoomNotJoinable);
            let db = state.db.clone();
            let inv = invitation.clone();
            let revert_result = tokio::task::spawn_blocking(move || {
                let conn = db.lock().map_err(|_| ApiError::internal("db lock poisoned"))?;
                if reopen {
                    let reopened = conn.execute(
                        "UPDATE room_invitations SET status = 'pending', responded_at = NULL
                         WHERE id = ?1 AND NOT EXISTS (
                             SELECT 1 FROM room_invitations
                             WHERE room_id = ?2 AND receiver_id = ?3 AND status = 'pending')",
                        rusqlite::params![inv.id, inv.room_id, inv.receiver_id],
                    )?;
                    if reopened == 1 {
                        return Ok::<_, ApiError>(());
                    }
                }
                conn.execute(
                    "UPDATE room_invitations SET status = 'expired', responded_at = ?2
                     WHERE id = ?1",
                    rusqlite::params![inv.id, Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await;
            match revert_result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(invitation_id = %invitation.id, error = %e, "invitation revert failed")
                }
                Err(e) => {
                    tracing::error!(invitation_id = %invitation.id, error = %e, "invitation revert task join failed")
                }
            }
            return Err(join_err);
        }
    }

    tracing::info!(
        invitation_id = %invitation.id,
        room_id = %invitation.room_id,
        accepted = accept,
        "invitation answered"
    );

    // Notify the sender on their user topic.
    state.bus.publish_user(
        &invitation.sender_id,
        UserEvent::InvitationAnswered {
            invitation_id: invitation.id.clone(),
            room_id: invitation.room_id.clone(),
            receiver_id: invitation.receiver_id.clone(),
            accepted: accept,
        },
    );

    Ok(Json(serde_json::json!({ "accepted": accept })))
}
