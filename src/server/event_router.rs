use std::sync::Arc;

use crate::protocol::{ClientEvent, ErrorCode, ServerEvent, SocketId, UserId};
use crate::server::GameServer;

impl GameServer {
    /// Entry point for every inbound client event.
    ///
    /// `authenticate` and `ping` are the only events an anonymous
    /// socket may send; everything else requires a bound user.
    pub async fn handle_client_event(self: &Arc<Self>, socket_id: SocketId, event: ClientEvent) {
        match event {
            ClientEvent::Authenticate { token } => {
                self.handle_authenticate(socket_id, &token).await;
            }
            ClientEvent::Ping {} => {
                self.send_to_socket(socket_id, ServerEvent::Pong).await;
            }
            other => {
                let Some(user_id) = self.sessions().user_for_socket(socket_id) else {
                    self.send_error(socket_id, ErrorCode::NotAuthenticated).await;
                    return;
                };
                self.route_authenticated(socket_id, user_id, other).await;
            }
        }
    }

    async fn handle_authenticate(self: &Arc<Self>, socket_id: SocketId, token: &str) {
        match self.tokens().verify(token) {
            Ok(user_id) => {
                // Single session per user: the previous socket is
                // evicted before this one becomes current.
                if let Some(evicted) = self.sessions().authenticate(socket_id, user_id) {
                    tracing::info!(
                        %user_id,
                        old_socket = %evicted,
                        new_socket = %socket_id,
                        "Evicting previous session for user"
                    );
                    self.sessions().evict_socket(evicted);
                }
                self.send_to_socket(socket_id, ServerEvent::Authenticated { user_id })
                    .await;
                tracing::info!(%socket_id, %user_id, "Socket authenticated");
            }
            Err(err) => {
                tracing::debug!(%socket_id, error = %err, "Authentication failed");
                self.send_error(socket_id, ErrorCode::NotAuthenticated).await;
            }
        }
    }

    async fn route_authenticated(
        self: &Arc<Self>,
        socket_id: SocketId,
        user_id: UserId,
        event: ClientEvent,
    ) {
        match event {
            ClientEvent::Authenticate { .. } | ClientEvent::Ping {} => {
                // Handled before routing.
            }
            ClientEvent::JoinRoom {
                room_id,
                room_code,
                team,
            } => {
                self.handle_join_room(socket_id, user_id, room_id, room_code.as_deref(), team)
                    .await;
            }
            ClientEvent::LeaveRoom { room_id, room_code } => {
                self.handle_leave_room(socket_id, user_id, room_id, room_code.as_deref())
                    .await;
            }
            ClientEvent::UpdateSettings { room_id, settings } => {
                self.handle_update_settings(socket_id, user_id, room_id, settings)
                    .await;
            }
            ClientEvent::SelectTeam { room_id, team } => {
                self.handle_select_team(socket_id, user_id, room_id, team)
                    .await;
            }
            ClientEvent::SetReady { room_id, room_code } => {
                self.handle_set_ready(socket_id, user_id, room_id, room_code.as_deref(), true)
                    .await;
            }
            ClientEvent::SetNotReady { room_id, room_code } => {
                self.handle_set_ready(socket_id, user_id, room_id, room_code.as_deref(), false)
                    .await;
            }
            ClientEvent::RemoveParticipant {
                room_id,
                user_id: target,
            } => {
                self.handle_remove_participant(socket_id, user_id, room_id, target)
                    .await;
            }
            ClientEvent::ContinueWaiting { room_id } => {
                self.handle_continue_waiting(socket_id, user_id, room_id)
                    .await;
            }
            ClientEvent::StartGame { room_id, room_code } => {
                self.handle_start_game(socket_id, user_id, room_id, room_code.as_deref())
                    .await;
            }
            ClientEvent::ChooseWord { room_id, word } => {
                self.handle_choose_word(socket_id, user_id, room_id, &word)
                    .await;
            }
            ClientEvent::DrawingData {
                room_id,
                room_code,
                strokes,
                is_finished,
                canvas_version,
                sequence,
            } => {
                self.handle_drawing_data(
                    socket_id,
                    user_id,
                    room_id,
                    room_code.as_deref(),
                    strokes,
                    is_finished.unwrap_or(false),
                    canvas_version,
                    sequence,
                )
                .await;
            }
            ClientEvent::ClearCanvas {
                room_id, room_code, ..
            } => {
                self.handle_clear_canvas(socket_id, user_id, room_id, room_code.as_deref())
                    .await;
            }
            ClientEvent::SendCanvasData {
                room_code,
                target_user_id,
                target_socket_id,
                history,
                last_sequence,
                remaining_time,
            } => {
                self.handle_send_canvas_data(
                    socket_id,
                    user_id,
                    &room_code,
                    target_user_id,
                    target_socket_id,
                    history,
                    last_sequence,
                    remaining_time,
                )
                .await;
            }
            ClientEvent::ResyncDone {} => {
                self.handle_resync_done(socket_id);
            }
            ClientEvent::ChatMessage {
                room_id,
                room_code,
                content,
            } => {
                self.handle_chat_message(socket_id, user_id, room_id, room_code.as_deref(), &content)
                    .await;
            }
            ClientEvent::SubmitGuess {
                room_id,
                room_code,
                guess,
            } => {
                self.handle_submit_guess(socket_id, user_id, room_id, room_code.as_deref(), &guess)
                    .await;
            }
            ClientEvent::SkipTurn { room_id } => {
                self.handle_skip_turn(socket_id, user_id, room_id).await;
            }
            ClientEvent::WordHint {
                room_id,
                room_code,
                revealed_word,
                hints_remaining,
            } => {
                self.handle_word_hint(
                    socket_id,
                    user_id,
                    room_id,
                    room_code.as_deref(),
                    revealed_word,
                    hints_remaining,
                )
                .await;
            }
            ClientEvent::PrepareToLeavePermanently {} => {
                self.sessions().mark_leaving_permanently(socket_id);
                tracing::debug!(%socket_id, "Client announced permanent leave");
            }
            ClientEvent::Report {
                room_id,
                target_user_id,
                kind,
            } => {
                self.handle_report(socket_id, user_id, room_id, target_user_id, kind)
                    .await;
            }
            ClientEvent::JoinVoice { room_id } => {
                self.handle_join_voice(socket_id, user_id, room_id).await;
            }
            ClientEvent::VoiceSignal { room_id, payload } => {
                self.handle_voice_signal(socket_id, user_id, room_id, payload)
                    .await;
            }
        }
    }
}
