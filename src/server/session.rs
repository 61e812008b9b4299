use dashmap::DashMap;
use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::protocol::{RoomId, ServerEvent, SocketId, UserId};

const JOIN_LOCK_CAPACITY: usize = 10_000;

/// Process-local session state: the socket registry, the single-session
/// map, join dedup locks, disconnect grace timers, per-room ready sets,
/// and resync flags. All maps are single-writer-per-key and never held
/// across I/O.
pub struct SessionRegistry {
    /// Live socket senders.
    sockets: DashMap<SocketId, mpsc::Sender<Arc<ServerEvent>>>,
    /// user -> current socket. At most one socket per user at any time.
    user_sockets: DashMap<UserId, SocketId>,
    /// socket -> authenticated user.
    socket_users: DashMap<SocketId, UserId>,
    /// socket -> joined room.
    socket_rooms: DashMap<SocketId, RoomId>,
    /// Sockets catching up on canvas state; live drawing deltas skip
    /// them until `resync_done`.
    resyncing: DashMap<SocketId, RoomId>,
    /// One canvas snapshot request per resume, keyed by (socket, room).
    canvas_requested: DashMap<(SocketId, RoomId), ()>,
    /// Armed disconnect grace timers.
    grace_timers: DashMap<(RoomId, UserId), CancellationToken>,
    /// Short-TTL join dedup locks: value is the socket holding the lock.
    join_locks: Mutex<LruCache<(RoomId, UserId), (SocketId, Instant)>>,
    join_lock_ttl: Duration,
    /// Users who tapped Ready, per room.
    ready: DashMap<RoomId, HashSet<UserId>>,
    /// Sockets that announced a permanent leave (1 s grace).
    leaving_permanently: DashMap<SocketId, ()>,
}

impl SessionRegistry {
    pub fn new(join_lock_ttl: Duration) -> Self {
        Self {
            sockets: DashMap::new(),
            user_sockets: DashMap::new(),
            socket_users: DashMap::new(),
            socket_rooms: DashMap::new(),
            resyncing: DashMap::new(),
            canvas_requested: DashMap::new(),
            grace_timers: DashMap::new(),
            join_locks: Mutex::new(LruCache::new(
                NonZeroUsize::new(JOIN_LOCK_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
            join_lock_ttl,
            ready: DashMap::new(),
            leaving_permanently: DashMap::new(),
        }
    }

    // -- socket registry ------------------------------------------------

    pub fn register_socket(&self, sender: mpsc::Sender<Arc<ServerEvent>>) -> SocketId {
        let socket_id = Uuid::new_v4();
        self.sockets.insert(socket_id, sender);
        socket_id
    }

    pub fn send_to_socket(&self, socket_id: SocketId, event: Arc<ServerEvent>) {
        if let Some(sender) = self.sockets.get(&socket_id) {
            if sender.try_send(event).is_err() {
                tracing::warn!(%socket_id, "Socket send queue full; event dropped");
            }
        }
    }

    pub fn has_socket(&self, socket_id: SocketId) -> bool {
        self.sockets.contains_key(&socket_id)
    }

    /// Bind an authenticated user to a socket, enforcing single-session:
    /// the previous socket, if any, is evicted and returned so the
    /// caller can close it.
    pub fn authenticate(&self, socket_id: SocketId, user_id: UserId) -> Option<SocketId> {
        self.socket_users.insert(socket_id, user_id);
        let previous = self.user_sockets.insert(user_id, socket_id);
        match previous {
            Some(old) if old != socket_id => Some(old),
            _ => None,
        }
    }

    /// Force-close a socket evicted by a newer session: dropping the
    /// sender ends the connection's write task.
    pub fn evict_socket(&self, socket_id: SocketId) {
        self.sockets.remove(&socket_id);
        self.socket_users.remove(&socket_id);
        self.socket_rooms.remove(&socket_id);
        self.clear_resync_flags(socket_id);
        self.leaving_permanently.remove(&socket_id);
    }

    pub fn socket_for_user(&self, user_id: UserId) -> Option<SocketId> {
        self.user_sockets.get(&user_id).map(|entry| *entry.value())
    }

    pub fn user_for_socket(&self, socket_id: SocketId) -> Option<UserId> {
        self.socket_users.get(&socket_id).map(|entry| *entry.value())
    }

    pub fn set_socket_room(&self, socket_id: SocketId, room_id: RoomId) {
        self.socket_rooms.insert(socket_id, room_id);
    }

    pub fn room_for_socket(&self, socket_id: SocketId) -> Option<RoomId> {
        self.socket_rooms.get(&socket_id).map(|entry| *entry.value())
    }

    pub fn clear_socket_room(&self, socket_id: SocketId) {
        self.socket_rooms.remove(&socket_id);
    }

    /// Tear down a disconnecting socket. The user->socket entry is
    /// cleared only when it still points at this socket, so a late
    /// disconnect cannot evict a newer connection.
    pub fn unregister_socket(&self, socket_id: SocketId) -> Option<(UserId, Option<RoomId>)> {
        self.sockets.remove(&socket_id);
        let room_id = self.socket_rooms.remove(&socket_id).map(|(_, room)| room);
        self.clear_resync_flags(socket_id);
        let was_permanent = self.leaving_permanently.remove(&socket_id).is_some();

        let user_id = self.socket_users.remove(&socket_id).map(|(_, user)| user)?;
        self.user_sockets
            .remove_if(&user_id, |_, current| *current == socket_id);

        // Preserve the flag for the grace-timer decision.
        if was_permanent {
            self.leaving_permanently.insert(socket_id, ());
        }
        Some((user_id, room_id))
    }

    pub fn connected_sockets(&self) -> usize {
        self.sockets.len()
    }

    // -- join dedup -----------------------------------------------------

    /// Acquire the short-TTL join lock for (room, user). A second join
    /// from the same socket inside the TTL is a duplicate and is
    /// rejected; a different socket (reconnect) always wins the lock.
    pub async fn try_acquire_join_lock(
        &self,
        room_id: RoomId,
        user_id: UserId,
        socket_id: SocketId,
    ) -> bool {
        let mut locks = self.join_locks.lock().await;
        let key = (room_id, user_id);
        if let Some((holder, acquired_at)) = locks.get(&key) {
            if *holder == socket_id && acquired_at.elapsed() < self.join_lock_ttl {
                return false;
            }
        }
        locks.put(key, (socket_id, Instant::now()));
        true
    }

    pub async fn release_join_lock(&self, room_id: RoomId, user_id: UserId) {
        let mut locks = self.join_locks.lock().await;
        locks.pop(&(room_id, user_id));
    }

    // -- disconnect grace ----------------------------------------------

    /// Arm a grace timer token; any previous timer for the seat is
    /// cancelled first.
    pub fn arm_grace_timer(&self, room_id: RoomId, user_id: UserId) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = self
            .grace_timers
            .insert((room_id, user_id), token.clone())
        {
            previous.cancel();
        }
        token
    }

    /// Cancel a pending grace timer (reconnect won the race).
    pub fn cancel_grace_timer(&self, room_id: RoomId, user_id: UserId) -> bool {
        if let Some((_, token)) = self.grace_timers.remove(&(room_id, user_id)) {
            token.cancel();
            true
        } else {
            false
        }
    }

    pub fn clear_grace_timer_entry(&self, room_id: RoomId, user_id: UserId) {
        self.grace_timers.remove(&(room_id, user_id));
    }

    pub fn has_grace_timer(&self, room_id: RoomId, user_id: UserId) -> bool {
        self.grace_timers.contains_key(&(room_id, user_id))
    }

    // -- ready set ------------------------------------------------------

    pub fn set_ready(&self, room_id: RoomId, user_id: UserId) {
        self.ready.entry(room_id).or_default().insert(user_id);
    }

    pub fn set_not_ready(&self, room_id: RoomId, user_id: UserId) {
        if let Some(mut set) = self.ready.get_mut(&room_id) {
            set.remove(&user_id);
        }
    }

    pub fn ready_set(&self, room_id: RoomId) -> HashSet<UserId> {
        self.ready
            .get(&room_id)
            .map(|set| set.clone())
            .unwrap_or_default()
    }

    pub fn clear_ready(&self, room_id: RoomId) {
        self.ready.remove(&room_id);
    }

    // -- resync flags ---------------------------------------------------

    pub fn mark_resyncing(&self, socket_id: SocketId, room_id: RoomId) {
        self.resyncing.insert(socket_id, room_id);
    }

    pub fn is_resyncing(&self, socket_id: SocketId) -> bool {
        self.resyncing.contains_key(&socket_id)
    }

    pub fn finish_resync(&self, socket_id: SocketId) {
        self.clear_resync_flags(socket_id);
    }

    /// First canvas request per (socket, room) wins; repeats are
    /// suppressed so overlapping resume triggers cannot storm the
    /// drawer.
    pub fn try_mark_canvas_requested(&self, socket_id: SocketId, room_id: RoomId) -> bool {
        match self.canvas_requested.entry((socket_id, room_id)) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(());
                true
            }
        }
    }

    fn clear_resync_flags(&self, socket_id: SocketId) {
        self.resyncing.remove(&socket_id);
        self.canvas_requested
            .retain(|(socket, _), ()| *socket != socket_id);
    }

    // -- permanent leave ------------------------------------------------

    pub fn mark_leaving_permanently(&self, socket_id: SocketId) {
        self.leaving_permanently.insert(socket_id, ());
    }

    pub fn is_leaving_permanently(&self, socket_id: SocketId) -> bool {
        self.leaving_permanently.contains_key(&socket_id)
    }

    pub fn clear_leaving_permanently(&self, socket_id: SocketId) {
        self.leaving_permanently.remove(&socket_id);
    }
}
