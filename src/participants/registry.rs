//! Connection-level participant queries and mutations.
//!
//! All functions here operate on an already-locked rusqlite Connection so
//! they can run inside a caller's transaction. Anything that touches a
//! capacity or status invariant must be called while holding the room's
//! exclusive lock (rooms::locks).

use chrono::Utc;
use rusqlite::Connection;
use uuid::Uuid;

use crate::config::RoomPolicy;
use crate::db::models::{ConnectionStatus, Participant, RoomStatus};
use crate::error::ApiError;
use crate::rooms::load_room;

fn row_to_participant(row: &rusqlite::Row<'_>) -> rusqlite::Result<Participant> {
    Ok(Participant {
        id: row.get(0)?,
        room_id: row.get(1)?,
        user_id: row.get(2)?,
        connection_status: ConnectionStatus::from_str(&row.get::<_, String>(3)?)
            .unwrap_or(ConnectionStatus::Exited),
        joined_at: row.get(4)?,
        disconnected_at: row.get(5)?,
    })
}

const PARTICIPANT_COLS: &str =
    "id, room_id, user_id, connection_status, joined_at, disconnected_at";

/// Look up a participant row for (room, user), if one exists.
pub fn get_participant(
    conn: &Connection,
    room_id: &str,
    user_id: &str,
) -> Result<Option<Participant>, ApiError> {
    let result = conn.query_row(
        &format!(
            "SELECT {PARTICIPANT_COLS} FROM room_participants
             WHERE room_id = ?1 AND user_id = ?2"
        ),
        [room_id, user_id],
        |row| row_to_participant(row),
    );
    match result {
        Ok(p) => Ok(Some(p)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Count occupied seats: ACTIVE plus DISCONNECTED. A disconnected
/// participant keeps their seat until the grace-period sweep exits them.
pub fn count_seated(conn: &Connection, room_id: &str) -> Result<i64, ApiError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM room_participants
         WHERE room_id = ?1 AND connection_status IN ('active', 'disconnected')",
        [room_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// All participants with ACTIVE connection status, in join order.
pub fn list_active(conn: &Connection, room_id: &str) -> Result<Vec<Participant>, ApiError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PARTICIPANT_COLS} FROM room_participants
         WHERE room_id = ?1 AND connection_status = 'active'
         ORDER BY joined_at"
    ))?;
    let participants = stmt
        .query_map([room_id], |row| row_to_participant(row))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(participants)
}

/// Insert a fresh ACTIVE participant row.
pub fn insert_participant(
    conn: &Connection,
    room_id: &str,
    user_id: &str,
) -> Result<Participant, ApiError> {
    let id = Uuid::now_v7().to_string();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO room_participants (id, room_id, user_id, connection_status, joined_at)
         VALUES (?1, ?2, ?3, 'active', ?4)",
        rusqlite::params![id, room_id, user_id, now],
    )?;

    Ok(Participant {
        id,
        room_id: room_id.to_string(),
        user_id: user_id.to_string(),
        connection_status: ConnectionStatus::Active,
        joined_at: now,
        disconnected_at: None,
    })
}

/// Set a participant's connection status. Clears the disconnect timestamp
/// unless the new status is DISCONNECTED.
pub fn set_status(
    conn: &Connection,
    room_id: &str,
    user_id: &str,
    status: ConnectionStatus,
) -> Result<usize, ApiError> {
    let disconnected_at = match status {
        ConnectionStatus::Disconnected => Some(Utc::now().to_rfc3339()),
        _ => None,
    };
    let rows = conn.execute(
        "UPDATE room_participants SET connection_status = ?3, disconnected_at = ?4
         WHERE room_id = ?1 AND user_id = ?2",
        rusqlite::params![room_id, user_id, status.as_str(), disconnected_at],
    )?;
    Ok(rows)
}

/// Join semantics, run under the room's exclusive lock.
///
/// Outcome by existing row:
/// - none: capacity-checked insert
/// - ACTIVE: idempotent, returns the existing row
/// - DISCONNECTED: reconnect without invitation, seat was already held
/// - EXITED: re-entry only via accepted invitation, or bare join when the
///   allow_rejoin_after_exit policy flag is set; capacity-checked again
///   because the seat was freed on exit
/// `newly_active` is false only for the idempotent already-ACTIVE case, so
/// callers can avoid re-announcing a join that changed nothing.
pub fn join_room_tx(
    conn: &Connection,
    policy: &RoomPolicy,
    room_id: &str,
    user_id: &str,
    via_invitation: bool,
) -> Result<(Participant, bool), ApiError> {
    let room = load_room(conn, room_id)?;
    if room.status == RoomStatus::Finished {
        return Err(ApiError::RoomNotJoinable);
    }

    match get_participant(conn, room_id, user_id)? {
        Some(p) if p.connection_status == ConnectionStatus::Active => Ok((p, false)),
        Some(p) if p.connection_status == ConnectionStatus::Disconnected => {
            set_status(conn, room_id, user_id, ConnectionStatus::Active)?;
            Ok((
                Participant {
                    connection_status: ConnectionStatus::Active,
                    disconnected_at: None,
                    ..p
                },
                true,
            ))
        }
        Some(p) => {
            // EXITED (voluntarily left or kicked)
            if !via_invitation && !policy.allow_rejoin_after_exit {
                return Err(ApiError::RoomNotJoinable);
            }
            if count_seated(conn, room_id)? >= room.capacity {
                return Err(ApiError::RoomFull);
            }
            set_status(conn, room_id, user_id, ConnectionStatus::Active)?;
            Ok((
                Participant {
                    connection_status: ConnectionStatus::Active,
                    disconnected_at: None,
                    ..p
                },
                true,
            ))
        }
        None => {
            if count_seated(conn, room_id)? >= room.capacity {
                return Err(ApiError::RoomFull);
            }
            Ok((insert_participant(conn, room_id, user_id)?, true))
        }
    }
}
