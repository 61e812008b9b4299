use crate::auth::SessionTokens;
use crate::cache::RoomCache;
use crate::clock::PhaseClock;
use crate::config::TimersConfig;
use crate::metrics::ServerMetrics;
use crate::protocol::{
    ParticipantInfo, Room, RoomId, RoomStatePayload, ServerEvent, SocketId, UserId,
};
use crate::retry::{RetryConfig, RetryExecutor};
use crate::store::{create_store, Participant, RoomStore, StoreConfig};
use crate::voice::VoiceRelay;
use crate::wallet::CoinWallet;
use crate::words::WordCatalog;
use anyhow::Result;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;

mod drawing;
mod event_router;
mod guess;
mod lifecycle;
mod phase_engine;
mod ready_state;
mod reports;
mod room_service;
mod rotation;
mod session;
#[cfg(test)]
mod session_tests;

pub use session::SessionRegistry;

/// Runtime server configuration, assembled from the loaded config file
/// in main.rs.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub grace_period: Duration,
    pub permanent_leave_grace: Duration,
    pub cache_ttl: Duration,
    pub phase_jitter_ms: u64,
    pub join_lock_ttl: Duration,
    pub chat_history_limit: usize,
    pub starting_balance: u32,
    pub voice_fee: u32,
    pub max_message_size: usize,
    pub timers: TimersConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(90),
            permanent_leave_grace: Duration::from_secs(1),
            cache_ttl: Duration::from_millis(3_000),
            phase_jitter_ms: 250,
            join_lock_ttl: Duration::from_millis(2_000),
            chat_history_limit: 50,
            starting_balance: 200,
            voice_fee: 10,
            max_message_size: 65_536,
            timers: TimersConfig::default(),
        }
    }
}

/// The authoritative game server: owns the store, the phase clock, and
/// the session layer, and drives every room's state machine.
pub struct GameServer {
    store: Arc<dyn RoomStore>,
    cache: RoomCache,
    clock: PhaseClock,
    sessions: SessionRegistry,
    words: Arc<dyn WordCatalog>,
    wallet: Arc<dyn CoinWallet>,
    voice: Arc<dyn VoiceRelay>,
    tokens: SessionTokens,
    config: ServerConfig,
    retry: RetryExecutor,
    pub(crate) metrics: Arc<ServerMetrics>,
    /// Flipped after the startup sweep and timer rebuild; joins before
    /// that are answered with `server_syncing`.
    accepting_joins: AtomicBool,
    /// Rooms whose owner has been warned that the lobby idle timer
    /// elapsed; a second expiry without `continue_waiting` deletes the
    /// room.
    lobby_idle_notified: dashmap::DashMap<RoomId, ()>,
}

impl GameServer {
    pub async fn new(
        config: ServerConfig,
        tokens: SessionTokens,
        words: Arc<dyn WordCatalog>,
        wallet: Arc<dyn CoinWallet>,
        voice: Arc<dyn VoiceRelay>,
    ) -> Result<Arc<Self>> {
        let store: Arc<dyn RoomStore> = Arc::from(create_store(StoreConfig::InMemory).await?);
        store.initialize().await?;

        let metrics = Arc::new(ServerMetrics::new());
        let cache = RoomCache::new(config.cache_ttl);
        let clock = PhaseClock::new(config.phase_jitter_ms);
        let sessions = SessionRegistry::new(config.join_lock_ttl);

        let server = Arc::new(Self {
            store,
            cache,
            clock,
            sessions,
            words,
            wallet,
            voice,
            tokens,
            config,
            retry: RetryExecutor::new(RetryConfig::storage()),
            metrics,
            accepting_joins: AtomicBool::new(false),
            lobby_idle_notified: dashmap::DashMap::new(),
        });

        Ok(server)
    }

    /// Crash-recovery startup: reap orphaned participants, rebuild
    /// phase timers from persisted end times, then open the join gate.
    pub async fn startup(self: &Arc<Self>) -> Result<()> {
        let affected = self.store.sweep_orphaned_participants().await?;
        for room_id in &affected {
            self.run_room_population_checks(*room_id).await;
        }
        if !affected.is_empty() {
            tracing::info!(rooms = affected.len(), "Startup sweep reaped orphaned participants");
        }

        self.rebuild_phase_timers().await?;

        self.accepting_joins.store(true, Ordering::SeqCst);
        tracing::info!("Startup recovery complete; accepting joins");
        Ok(())
    }

    pub fn is_accepting_joins(&self) -> bool {
        self.accepting_joins.load(Ordering::SeqCst)
    }

    /// Used by tests that construct game state directly.
    pub fn open_join_gate(&self) {
        self.accepting_joins.store(true, Ordering::SeqCst);
    }

    pub fn store(&self) -> &dyn RoomStore {
        self.store.as_ref()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<ServerMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn tokens(&self) -> &SessionTokens {
        &self.tokens
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub(crate) fn clock(&self) -> &PhaseClock {
        &self.clock
    }

    pub async fn health_check(&self) -> bool {
        true
    }

    /// Register a fresh, not-yet-authenticated socket.
    pub fn register_socket(&self, sender: mpsc::Sender<Arc<ServerEvent>>) -> SocketId {
        let socket_id = self.sessions.register_socket(sender);
        self.metrics.increment_connections();
        tracing::info!(%socket_id, "Socket connected");
        socket_id
    }

    /// Fetch a room through the store, refreshing the hot snapshot on
    /// the way out. Every read that precedes a write goes through here.
    pub(crate) async fn fetch_room(&self, room_id: RoomId) -> Result<Option<Room>> {
        let room = self.store.get_room(room_id).await?;
        if let Some(room) = &room {
            self.cache.refresh(room);
        }
        Ok(room)
    }

    pub(crate) async fn fetch_room_by_code(&self, code: &str) -> Result<Option<Room>> {
        let room = self.store.get_room_by_code(code).await?;
        if let Some(room) = &room {
            self.cache.refresh(room);
        }
        Ok(room)
    }

    /// Client-facing participant snapshots, with ready/connected state
    /// stitched in from the session registry.
    pub(crate) async fn participant_infos(&self, room: &Room) -> Result<Vec<ParticipantInfo>> {
        let participants = self.store.participants(room.id).await?;
        let ready = self.sessions.ready_set(room.id);
        Ok(participants
            .iter()
            .filter(|p| !p.is_banned())
            .map(|p| self.participant_info(room, p, &ready))
            .collect())
    }

    pub(crate) fn participant_info(
        &self,
        room: &Room,
        participant: &Participant,
        ready: &std::collections::HashSet<UserId>,
    ) -> ParticipantInfo {
        ParticipantInfo {
            user_id: participant.user_id,
            team: participant.team,
            is_owner: room.owner_id == participant.user_id,
            is_drawer: participant.is_drawer,
            is_ready: ready.contains(&participant.user_id),
            is_active: participant.is_active,
            connected: participant.socket_id.is_some(),
            score: participant.score,
            has_guessed_this_round: participant.has_guessed_this_round,
        }
    }

    /// Full room payload for `room_joined` and `canvas_resume`.
    pub(crate) async fn room_state_payload(&self, room: &Room) -> Result<RoomStatePayload> {
        let participants = self.participant_infos(room).await?;
        Ok(RoomStatePayload {
            room_id: room.id,
            room_code: room.code.clone(),
            owner_id: room.owner_id,
            status: room.status,
            game_mode: room.game_mode,
            max_players: room.max_players,
            is_public: room.is_public,
            settings: room.settings.clone(),
            current_round: room.current_round,
            round_phase: room.round_phase,
            phase_end_time: room.round_phase_end_time,
            remaining_time: room.remaining_seconds(Utc::now()),
            current_drawer_id: room.current_drawer_id,
            canvas_version: room.canvas_version,
            participants,
        })
    }

    // ------------------------------------------------------------------
    // Messaging. Socket resolution happens at send time, never earlier:
    // a user who reconnected mid-operation receives events on the new
    // socket, not a stale one.
    // ------------------------------------------------------------------

    pub(crate) async fn send_to_socket(&self, socket_id: SocketId, event: ServerEvent) {
        self.sessions.send_to_socket(socket_id, Arc::new(event));
    }

    pub(crate) async fn send_to_user(&self, user_id: UserId, event: ServerEvent) {
        if let Some(socket_id) = self.sessions.socket_for_user(user_id) {
            self.sessions.send_to_socket(socket_id, Arc::new(event));
        } else {
            tracing::debug!(%user_id, "No live socket for user; event dropped");
        }
    }

    pub(crate) async fn send_error(
        &self,
        socket_id: SocketId,
        code: crate::protocol::ErrorCode,
    ) {
        self.send_to_socket(socket_id, ServerEvent::error(code)).await;
    }

    /// Broadcast to every connected participant of a room.
    pub(crate) async fn broadcast_to_room(&self, room_id: RoomId, event: ServerEvent) {
        let Ok(participants) = self.store.participants(room_id).await else {
            return;
        };
        let event = Arc::new(event);
        for participant in participants {
            if let Some(socket_id) = participant.socket_id {
                self.sessions.send_to_socket(socket_id, Arc::clone(&event));
            }
        }
    }

    pub(crate) async fn broadcast_to_room_except(
        &self,
        room_id: RoomId,
        except_user: UserId,
        event: ServerEvent,
    ) {
        let Ok(participants) = self.store.participants(room_id).await else {
            return;
        };
        let event = Arc::new(event);
        for participant in participants {
            if participant.user_id == except_user {
                continue;
            }
            if let Some(socket_id) = participant.socket_id {
                self.sessions.send_to_socket(socket_id, Arc::clone(&event));
            }
        }
    }

    /// Rebroadcast the authoritative participant list.
    pub(crate) async fn broadcast_participants(&self, room: &Room) {
        match self.participant_infos(room).await {
            Ok(participants) => {
                self.broadcast_to_room(room.id, ServerEvent::RoomParticipants { participants })
                    .await;
            }
            Err(err) => {
                tracing::warn!(room_id = room.id, error = %err, "Failed to load participants for broadcast");
            }
        }
    }

    pub(crate) fn retry(&self) -> &RetryExecutor {
        &self.retry
    }

    pub(crate) fn wallet(&self) -> &dyn CoinWallet {
        self.wallet.as_ref()
    }

    pub(crate) fn words(&self) -> &dyn WordCatalog {
        self.words.as_ref()
    }

    pub(crate) fn voice(&self) -> &dyn VoiceRelay {
        self.voice.as_ref()
    }

    pub(crate) fn cache(&self) -> &RoomCache {
        &self.cache
    }
}
