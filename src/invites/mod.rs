//! Room invitations: offer, response, and bulk expiry on room finish.

pub mod respond;
pub mod send;

use rusqlite::Connection;

use crate::db::models::{Invitation, InvitationStatus};
use crate::error::ApiError;

pub(crate) fn row_to_invitation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Invitation> {
    Ok(Invitation {
        id: row.get(0)?,
        room_id: row.get(1)?,
        sender_id: row.get(2)?,
        receiver_id: row.get(3)?,
        status: InvitationStatus::from_str(&row.get::<_, String>(4)?)
            .unwrap_or(InvitationStatus::Expired),
        created_at: row.get(5)?,
        responded_at: row.get(6)?,
    })
}

pub(crate) const INVITATION_COLS: &str =
    "id, room_id, sender_id, receiver_id, status, created_at, responded_at";

/// Bulk-expire all PENDING invitations for a room.
///
/// Called only from the finish transition, inside the same transaction that
/// flips the room to FINISHED — the two facts (room finished, invitations
/// closed) are never observable apart.
pub fn expire_all_for_room(conn: &Connection, room_id: &str) -> Result<usize, ApiError> {
    let now = chrono::Utc::now().to_rfc3339();
    let expired = conn.execute(
        "UPDATE room_invitations SET status = 'expired', responded_at = ?2
         WHERE room_id = ?1 AND status = 'pending'",
        rusqlite::params![room_id, now],
    )?;
    if expired > 0 {
        tracing::debug!(room_id = %room_id, expired, "expired pending invitations");
    }
    Ok(expired)
}
