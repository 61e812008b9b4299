//! Process-wide counters exposed on the metrics endpoint.

use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ServerMetrics {
    active_connections: AtomicI64,
    total_connections: AtomicU64,
    games_started: AtomicU64,
    games_completed: AtomicU64,
    rooms_deleted: AtomicU64,
    players_joined: AtomicU64,
    players_left: AtomicU64,
    guesses_submitted: AtomicU64,
    correct_guesses: AtomicU64,
    phase_timers_fired: AtomicU64,
    /// Timer callbacks and event handlers that lost their phase CAS.
    phase_cas_losses: AtomicU64,
    reconnections: AtomicU64,
    grace_expirations: AtomicU64,
    drawing_messages: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub active_connections: i64,
    pub total_connections: u64,
    pub games_started: u64,
    pub games_completed: u64,
    pub rooms_deleted: u64,
    pub players_joined: u64,
    pub players_left: u64,
    pub guesses_submitted: u64,
    pub correct_guesses: u64,
    pub phase_timers_fired: u64,
    pub phase_cas_losses: u64,
    pub reconnections: u64,
    pub grace_expirations: u64,
    pub drawing_messages: u64,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_active_connections(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn increment_games_started(&self) {
        self.games_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_games_completed(&self) {
        self.games_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rooms_deleted(&self) {
        self.rooms_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_players_joined(&self) {
        self.players_joined.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_players_left(&self) {
        self.players_left.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_guesses_submitted(&self) {
        self.guesses_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_correct_guesses(&self) {
        self.correct_guesses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_phase_timers_fired(&self) {
        self.phase_timers_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_phase_cas_losses(&self) {
        self.phase_cas_losses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_reconnections(&self) {
        self.reconnections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_grace_expirations(&self) {
        self.grace_expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_drawing_messages(&self) {
        self.drawing_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_connections: self.active_connections.load(Ordering::Relaxed),
            total_connections: self.total_connections.load(Ordering::Relaxed),
            games_started: self.games_started.load(Ordering::Relaxed),
            games_completed: self.games_completed.load(Ordering::Relaxed),
            rooms_deleted: self.rooms_deleted.load(Ordering::Relaxed),
            players_joined: self.players_joined.load(Ordering::Relaxed),
            players_left: self.players_left.load(Ordering::Relaxed),
            guesses_submitted: self.guesses_submitted.load(Ordering::Relaxed),
            correct_guesses: self.correct_guesses.load(Ordering::Relaxed),
            phase_timers_fired: self.phase_timers_fired.load(Ordering::Relaxed),
            phase_cas_losses: self.phase_cas_losses.load(Ordering::Relaxed),
            reconnections: self.reconnections.load(Ordering::Relaxed),
            grace_expirations: self.grace_expirations.load(Ordering::Relaxed),
            drawing_messages: self.drawing_messages.load(Ordering::Relaxed),
        }
    }
}
