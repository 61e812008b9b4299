//! Voice transport contract.
//!
//! Voice runs on an SFU plus a signaling relay; from the game server's
//! point of view it is an opaque collaborator. Events are forwarded
//! verbatim and replies come back as opaque payloads.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::protocol::{RoomId, UserId};

#[async_trait]
pub trait VoiceRelay: Send + Sync {
    /// Attach a user to a room's voice session.
    async fn join(&self, room_id: RoomId, user_id: UserId) -> Result<Value>;

    /// Relay a signaling payload (createTransport, produce, consume, ...).
    async fn signal(&self, room_id: RoomId, user_id: UserId, payload: Value) -> Result<Value>;

    /// Tear down a room's voice session when the room closes.
    async fn close_room(&self, room_id: RoomId) -> Result<()>;
}

/// Used when no SFU is deployed; every call succeeds with an empty
/// reply so the game flow never depends on voice availability.
#[derive(Default)]
pub struct NullVoiceRelay;

#[async_trait]
impl VoiceRelay for NullVoiceRelay {
    async fn join(&self, room_id: RoomId, user_id: UserId) -> Result<Value> {
        tracing::debug!(%room_id, %user_id, "Voice join ignored (no relay configured)");
        Ok(Value::Null)
    }

    async fn signal(&self, _room_id: RoomId, _user_id: UserId, _payload: Value) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn close_room(&self, _room_id: RoomId) -> Result<()> {
        Ok(())
    }
}
