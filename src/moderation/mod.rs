//! Moderation boundary.
//!
//! Sanction bookkeeping belongs to an external collaborator; the room core
//! only consumes `assert_not_banned` as a precondition (chat send,
//! invitation acceptance) and exposes the thin admin endpoints that feed the
//! forced-logout path over the user topic.

pub mod ban;
pub mod kick;

use chrono::Utc;
use rusqlite::Connection;

use crate::error::ApiError;

/// WebSocket close code for banned users.
pub const CLOSE_BANNED: u16 = 4003;

/// Fail with `BannedUser` if the user has an unexpired ban.
pub fn assert_not_banned(conn: &Connection, user_id: &str) -> Result<(), ApiError> {
    let now = Utc::now().to_rfc3339();
    let banned: bool = conn.query_row(
        "SELECT COUNT(*) FROM bans
         WHERE user_id = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
        rusqlite::params![user_id, now],
        |row| row.get::<_, i64>(0).map(|c| c > 0),
    )?;

    if banned {
        return Err(ApiError::BannedUser);
    }
    Ok(())
}
