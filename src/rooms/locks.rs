//! Per-room exclusive locks.
//!
//! The room row is the single serialization point for status transitions and
//! capacity checks: every read-check-write sequence (start/pause/finish,
//! capacity-checked join, kick, the disconnect sweep) runs inside this lock.
//! The lock is never held across a bus publish — publishes happen after the
//! guard is dropped.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::ApiError;

/// Lock table: one async mutex per room id, created on first use.
#[derive(Clone, Default)]
pub struct RoomLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl RoomLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the exclusive lock for a room, waiting at most `timeout`.
    /// A timeout maps to `Busy`: the caller may retry with backoff; it is
    /// not an invariant violation.
    pub async fn acquire(
        &self,
        room_id: &str,
        timeout: Duration,
    ) -> Result<OwnedMutexGuard<()>, ApiError> {
        let lock = self
            .locks
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        tokio::time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!(room_id = %room_id, "room lock acquisition timed out");
                ApiError::Busy
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_is_exclusive_per_room() {
        let locks = RoomLocks::new();
        let guard = locks.acquire("r1", Duration::from_secs(1)).await.unwrap();

        // Same room: times out while the first guard is held.
        let busy = locks.acquire("r1", Duration::from_millis(50)).await;
        assert!(matches!(busy, Err(ApiError::Busy)));

        // Different room: independent lock.
        let other = locks.acquire("r2", Duration::from_millis(50)).await;
        assert!(other.is_ok());

        drop(guard);
        let again = locks.acquire("r1", Duration::from_millis(50)).await;
        assert!(again.is_ok());
    }
}
