#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_excessive_bools,
    clippy::too_many_arguments,
    clippy::too_many_lines,
    clippy::similar_names
)]

//! # Doodle Duel Server
//!
//! Authoritative real-time server for a multiplayer drawing-and-guessing
//! game. Rooms progress through timed phases driven by an atomic phase
//! state machine; clients connect over a WebSocket event protocol; the
//! server owns game truth and broadcasts state.

/// Bearer session token verification
pub mod auth;

/// Short-TTL snapshot cache of hot room fields
pub mod cache;

/// Wall-clock-authoritative phase timers
pub mod clock;

/// Server configuration and environment variables
pub mod config;

/// Structured logging configuration
pub mod logging;

/// Metrics collection and reporting
pub mod metrics;

/// Event protocol definitions and the room record
pub mod protocol;

/// Retry logic utilities
pub mod retry;

/// Room and participant storage
pub mod store;

/// Main server orchestration
pub mod server;

/// Voice transport contract (opaque collaborator)
pub mod voice;

/// Coin wallet contract
pub mod wallet;

/// WebSocket connection handling
pub mod websocket;

/// Word catalog contract and selection logic
pub mod words;
