pub mod crud;
pub mod lifecycle;
pub mod locks;

use rusqlite::Connection;

use crate::db::models::{Room, RoomStatus};
use crate::error::ApiError;

/// Load a room row, mapping a missing row to NotFound.
pub fn load_room(conn: &Connection, room_id: &str) -> Result<Room, ApiError> {
    conn.query_row(
        "SELECT id, host_id, title, book_ref, status, capacity, created_at, updated_at
         FROM rooms WHERE id = ?1",
        [room_id],
        |row| {
            Ok(Room {
                id: row.get(0)?,
                host_id: row.get(1)?,
                title: row.get(2)?,
                book_ref: row.get(3)?,
                status: RoomStatus::from_str(&row.get::<_, String>(4)?)
                    .unwrap_or(RoomStatus::Finished),
                capacity: row.get(5)?,
                created_at: row.get(6)?,
                updated_at: row.get(7)?,
            })
        },
    )
    .map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => ApiError::NotFound("room"),
        other => ApiError::from(other),
    })
}
