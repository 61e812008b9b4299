//! Wall-clock-authoritative single-shot timers, keyed by room code and
//! slot.
//!
//! A timer is scheduled at an absolute expiry (the persisted
//! `round_phase_end_time`), so process restarts reschedule from the
//! store and the countdown a client sees never depends on when the
//! server booted. A small deterministic jitter derived from the room id
//! spreads mass expirations after a restart.
//!
//! The clock itself knows nothing about phases beyond the key: the
//! callback guard ("is the phase still the one I scheduled for?") lives
//! with the caller, which consults the room cache before acting.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::protocol::{RoomId, RoundPhase};

/// What a scheduled expiry belongs to. Phase slots are exclusive per
/// (room, phase); the lobby idle timer lives beside them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerSlot {
    Phase(RoundPhase),
    LobbyIdle,
}

impl std::fmt::Display for TimerSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimerSlot::Phase(phase) => write!(f, "{phase}"),
            TimerSlot::LobbyIdle => write!(f, "lobby_idle"),
        }
    }
}

struct TimerEntry {
    generation: u64,
    token: CancellationToken,
}

pub struct PhaseClock {
    timers: Arc<DashMap<(String, TimerSlot), TimerEntry>>,
    generations: AtomicU64,
    jitter_ms: u64,
}

impl PhaseClock {
    pub fn new(jitter_ms: u64) -> Self {
        Self {
            timers: Arc::new(DashMap::new()),
            generations: AtomicU64::new(0),
            jitter_ms,
        }
    }

    /// Deterministic per-room jitter: `room_id mod jitter_ms`.
    pub fn jitter_for(&self, room_id: RoomId) -> Duration {
        if self.jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(room_id.unsigned_abs() % self.jitter_ms)
        }
    }

    /// Schedule `callback` to run at the absolute `fire_at` (plus
    /// jitter). An existing timer in the same slot is cancelled first;
    /// re-entering a phase therefore replaces its expiry instead of
    /// stacking a second one.
    pub fn schedule<F, Fut>(
        &self,
        room_code: &str,
        slot: TimerSlot,
        room_id: RoomId,
        fire_at: DateTime<Utc>,
        callback: F,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let key = (room_code.to_string(), slot);
        let token = CancellationToken::new();
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);

        if let Some(previous) = self.timers.insert(
            key.clone(),
            TimerEntry {
                generation,
                token: token.clone(),
            },
        ) {
            previous.token.cancel();
        }

        let delay = fire_at
            .signed_duration_since(Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            + self.jitter_for(room_id);

        let timers = Arc::clone(&self.timers);
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    tracing::debug!(room_code = %key.0, slot = %key.1, "Phase timer fired");
                    callback().await;
                }
            }
            timers.remove_if(&key, |_, entry| entry.generation == generation);
        });
    }

    /// Cancel one slot's timer, if any.
    pub fn cancel(&self, room_code: &str, slot: TimerSlot) {
        if let Some((_, entry)) = self.timers.remove(&(room_code.to_string(), slot)) {
            entry.token.cancel();
        }
    }

    /// Cancel every timer for a room (leave, owner leave, deletion).
    pub fn cancel_room(&self, room_code: &str) {
        self.timers.retain(|(code, _), entry| {
            if code == room_code {
                entry.token.cancel();
                false
            } else {
                true
            }
        });
    }

    /// Number of live timers; used by tests and the metrics endpoint.
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}
