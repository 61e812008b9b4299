//! Short-TTL read-through snapshot of hot room fields.
//!
//! The cache exists for one consumer: the phase clock's callback guard,
//! which needs to answer "is the phase still the one I was scheduled
//! for?" without a store round-trip on every timer fire. It is refreshed
//! by every successful room mutation and is never a source of truth —
//! any path that writes fetches through the store first.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::protocol::{remaining_seconds, Room, RoomId, RoomStatus, RoundPhase};

/// Minimal snapshot of the fields the clock guard and countdown
/// queries need.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub id: RoomId,
    pub code: String,
    pub status: RoomStatus,
    pub round_phase: Option<RoundPhase>,
    pub round_phase_end_time: Option<DateTime<Utc>>,
}

impl RoomSnapshot {
    pub fn of(room: &Room) -> Self {
        Self {
            id: room.id,
            code: room.code.clone(),
            status: room.status,
            round_phase: room.round_phase,
            round_phase_end_time: room.round_phase_end_time,
        }
    }

    /// Whole seconds left in the snapshotted phase.
    pub fn remaining_time(&self, now: DateTime<Utc>) -> u64 {
        remaining_seconds(self.round_phase_end_time, now)
    }
}

struct CachedEntry {
    snapshot: RoomSnapshot,
    stored_at: Instant,
}

pub struct RoomCache {
    entries: DashMap<RoomId, CachedEntry>,
    code_index: DashMap<String, RoomId>,
    ttl: Duration,
}

impl RoomCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            code_index: DashMap::new(),
            ttl: ttl.max(Duration::from_millis(100)),
        }
    }

    /// Refresh the snapshot after a successful store mutation.
    pub fn refresh(&self, room: &Room) {
        self.code_index.insert(room.code.clone(), room.id);
        self.entries.insert(
            room.id,
            CachedEntry {
                snapshot: RoomSnapshot::of(room),
                stored_at: Instant::now(),
            },
        );
    }

    /// Fresh snapshot by id, or `None` when absent or past the TTL.
    pub fn get(&self, room_id: RoomId) -> Option<RoomSnapshot> {
        let entry = self.entries.get(&room_id)?;
        if entry.stored_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.snapshot.clone())
    }

    pub fn get_by_code(&self, code: &str) -> Option<RoomSnapshot> {
        let room_id = *self.code_index.get(code)?;
        self.get(room_id)
    }

    pub fn remove(&self, room_id: RoomId) {
        if let Some((_, entry)) = self.entries.remove(&room_id) {
            self.code_index.remove(&entry.snapshot.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{GameMode, RoomSettings};
    use chrono::Duration as ChronoDuration;

    fn test_room(id: RoomId) -> Room {
        Room::new(
            id,
            "ABCDE".to_string(),
            1,
            8,
            true,
            GameMode::Solo,
            RoomSettings::default(),
        )
    }

    #[test]
    fn test_refresh_and_lookup() {
        let cache = RoomCache::new(Duration::from_secs(5));
        let mut room = test_room(1);
        room.enter_phase(
            RoundPhase::Drawing,
            Some(Utc::now() + ChronoDuration::seconds(80)),
        );
        cache.refresh(&room);

        let snapshot = cache.get(1).expect("snapshot should be fresh");
        assert_eq!(snapshot.round_phase, Some(RoundPhase::Drawing));
        assert_eq!(cache.get_by_code("ABCDE").unwrap().id, 1);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = RoomCache::new(Duration::from_millis(100));
        let room = test_room(1);
        cache.refresh(&room);

        std::thread::sleep(Duration::from_millis(150));
        assert!(cache.get(1).is_none(), "stale snapshots must not be served");
    }

    #[test]
    fn test_remove_clears_code_index() {
        let cache = RoomCache::new(Duration::from_secs(5));
        let room = test_room(1);
        cache.refresh(&room);
        cache.remove(1);
        assert!(cache.get(1).is_none());
        assert!(cache.get_by_code("ABCDE").is_none());
    }

    #[test]
    fn test_snapshot_remaining_time() {
        let now = Utc::now();
        let mut room = test_room(1);
        room.enter_phase(RoundPhase::Drawing, Some(now + ChronoDuration::seconds(50)));
        let snapshot = RoomSnapshot::of(&room);
        assert_eq!(snapshot.remaining_time(now), 50);
        assert_eq!(snapshot.remaining_time(now + ChronoDuration::seconds(60)), 0);
    }
}
