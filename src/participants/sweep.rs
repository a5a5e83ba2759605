//! Background sweep converting stale DISCONNECTED seats to EXITED.
//!
//! A participant who loses their connection keeps their seat for the grace
//! period so they can reconnect without a fresh invitation. Past that, the
//! sweep frees the seat. Each room is processed under the same exclusive
//! lock as join/finish, so a seat is never freed underneath a concurrent
//! capacity check.

use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;

use crate::bus::RoomEvent;
use crate::db::models::{ConnectionStatus, RoomStatus};
use crate::error::ApiError;
use crate::participants::registry;
use crate::state::AppState;

/// Spawn the periodic disconnect sweep task.
pub fn spawn_disconnect_sweep(state: AppState) {
    let interval = Duration::from_secs(state.policy.sweep_interval_secs);

    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            match run_sweep(&state).await {
                Ok(0) => {
                    tracing::debug!("disconnect sweep: nothing stale");
                }
                Ok(count) => {
                    tracing::info!("disconnect sweep: exited {} stale participants", count);
                }
                Err(e) => {
                    tracing::error!("disconnect sweep error: {}", e);
                }
            }
        }
    });
}

/// One sweep pass. Returns the number of participants exited.
/// Exposed for tests, which call it directly instead of waiting on the timer.
pub async fn run_sweep(state: &AppState) -> Result<usize, ApiError> {
    let cutoff = (Utc::now()
        - ChronoDuration::seconds(state.policy.disconnect_grace_secs as i64))
    .to_rfc3339();

    // Snapshot stale (room, user) pairs without any lock, then reconcile
    // each room under its lock so a racing reconnect wins cleanly.
    let db = state.db.clone();
    let stale: Vec<(String, String)> = tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| ApiError::internal("db lock poisoned"))?;
        // Finished rooms are excluded: their participant rows are frozen as
        // the audit record of who was present at finish.
        let mut stmt = conn.prepare(
            "SELECT p.room_id, p.user_id FROM room_participants p
             JOIN rooms r ON r.id = p.room_id
             WHERE p.connection_status = 'disconnected'
               AND p.disconnected_at <= ?1
               AND r.status != 'finished'",
        )?;
        let rows = stmt
            .query_map([cutoff], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok::<_, ApiError>(rows)
    })
    .await??;

    let lock_timeout = Duration::from_secs(state.policy.lock_timeout_secs);
    let mut exited = 0;

    for (room_id, user_id) in stale {
        let guard = match state.room_locks.acquire(&room_id, lock_timeout).await {
            Ok(guard) => guard,
            Err(_) => continue, // busy room, next pass will catch it
        };

        let db = state.db.clone();
        let rid = room_id.clone();
        let uid = user_id.clone();

        let changed = tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| ApiError::internal("db lock poisoned"))?;
            // Re-check under the lock: the user may have reconnected, or the
            // room may have finished, since the snapshot.
            let room = crate::rooms::load_room(&conn, &rid)?;
            if room.status == RoomStatus::Finished {
                return Ok::<_, ApiError>(false);
            }
            match registry::get_participant(&conn, &rid, &uid)? {
                Some(p) if p.connection_status == ConnectionStatus::Disconnected => {
                    registry::set_status(&conn, &rid, &uid, ConnectionStatus::Exited)?;
                    Ok::<_, ApiError>(true)
                }
                _ => Ok(false),
            }
        })
        .await??;

        drop(guard);

        if changed {
            exited += 1;
            state.bus.publish_room(
                &room_id,
                RoomEvent::ParticipantLeft {
                    room_id: room_id.clone(),
                    user_id,
                },
            );
        }
    }

    Ok(exited)
}
