use chrono::Utc;
use std::sync::Arc;

use crate::protocol::{
    ErrorCode, GameMode, RankingEntry, RoomId, RoundPhase, ServerEvent, SocketId, Team, UserId,
    MAX_POINTS_PER_ROUND,
};
use crate::server::GameServer;
use crate::store::Participant;

use super::phase_engine::DrawingEndReason;

/// Guesser reward: `min(⌈remaining/8⌉, max_points_per_round)`.
pub(super) fn guess_reward(remaining_secs: u64) -> u32 {
    let raw = remaining_secs.div_ceil(8) as u32;
    raw.min(MAX_POINTS_PER_ROUND)
}

/// Solo drawer reward: `min(20·G / max(1, N−1), max_points_per_round)`
/// where G is the number of correct guessers and N the player count.
pub(super) fn drawer_reward(guessed: u32, player_count: u32) -> u32 {
    let raw = 20 * guessed / player_count.saturating_sub(1).max(1);
    raw.min(MAX_POINTS_PER_ROUND)
}

/// Final rankings and coin rewards.
///
/// Solo: strictly unique places by `(score DESC, points_updated_at ASC)`
/// with user id as the final deterministic key. Two players: winner
/// takes 2·entry; three or more: 3/2/1·entry for the podium. Team: the
/// higher team total wins and every winning member receives 2·entry.
pub(super) fn compute_rankings(
    game_mode: GameMode,
    entry_points: u32,
    participants: &[Participant],
) -> Vec<RankingEntry> {
    let mut players: Vec<&Participant> =
        participants.iter().filter(|p| !p.is_banned()).collect();

    match game_mode {
        GameMode::Solo => {
            players.sort_by(|a, b| {
                b.score
                    .cmp(&a.score)
                    .then(a.points_updated_at.cmp(&b.points_updated_at))
                    .then(a.user_id.cmp(&b.user_id))
            });
            let n = players.len();
            players
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let rank = (i + 1) as u32;
                    let reward = match (n, rank) {
                        (2, 1) => 2 * entry_points,
                        (n, 1) if n >= 3 => 3 * entry_points,
                        (n, 2) if n >= 3 => 2 * entry_points,
                        (n, 3) if n >= 3 => entry_points,
                        _ => 0,
                    };
                    RankingEntry {
                        user_id: p.user_id,
                        rank,
                        score: p.score,
                        team: p.team,
                        reward,
                    }
                })
                .collect()
        }
        GameMode::Team => {
            let total = |team: Team| -> u32 {
                players
                    .iter()
                    .filter(|p| p.team == Some(team))
                    .map(|p| p.score)
                    .sum()
            };
            let blue_total = total(Team::Blue);
            let orange_total = total(Team::Orange);
            let winner = match blue_total.cmp(&orange_total) {
                std::cmp::Ordering::Greater => Some(Team::Blue),
                std::cmp::Ordering::Less => Some(Team::Orange),
                std::cmp::Ordering::Equal => None,
            };

            players.sort_by(|a, b| {
                let a_wins = a.team == winner;
                let b_wins = b.team == winner;
                b_wins
                    .cmp(&a_wins)
                    .then(b.score.cmp(&a.score))
                    .then(a.points_updated_at.cmp(&b.points_updated_at))
                    .then(a.user_id.cmp(&b.user_id))
            });
            players
                .iter()
                .map(|p| {
                    let won = winner.is_some() && p.team == winner;
                    RankingEntry {
                        user_id: p.user_id,
                        rank: if won || winner.is_none() { 1 } else { 2 },
                        score: p.score,
                        team: p.team,
                        reward: if won { 2 * entry_points } else { 0 },
                    }
                })
                .collect()
        }
    }
}

impl GameServer {
    pub(super) async fn handle_submit_guess(
        self: &Arc<Self>,
        socket_id: SocketId,
        user_id: UserId,
        room_id: Option<RoomId>,
        room_code: Option<&str>,
        guess: &str,
    ) {
        self.metrics.increment_guesses_submitted();

        let room = match self.resolve_room(room_id, room_code).await {
            Ok(Some(room)) => room,
            Ok(None) => {
                self.send_error(socket_id, ErrorCode::RoomNotFound).await;
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to resolve room for submit_guess");
                return;
            }
        };

        if room.round_phase != Some(RoundPhase::Drawing) {
            self.send_error(socket_id, ErrorCode::WrongPhase).await;
            return;
        }
        let Some(word) = room.current_word.clone() else {
            self.send_error(socket_id, ErrorCode::WrongPhase).await;
            return;
        };

        let participant = match self.store().get_participant(room.id, user_id).await {
            Ok(Some(p)) if p.is_active && !p.is_banned() => p,
            Ok(_) => {
                self.send_error(socket_id, ErrorCode::RoomNotFound).await;
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to load participant for submit_guess");
                return;
            }
        };

        if room.current_drawer_id == Some(user_id) {
            self.send_error(socket_id, ErrorCode::DrawerCannotGuess).await;
            return;
        }
        if participant.has_guessed_this_round {
            self.send_error(socket_id, ErrorCode::AlreadyGuessed).await;
            return;
        }

        let drawer_team = match room.game_mode {
            GameMode::Team => {
                let drawer_team = match room.current_drawer_id {
                    Some(drawer) => self
                        .store()
                        .get_participant(room.id, drawer)
                        .await
                        .ok()
                        .flatten()
                        .and_then(|p| p.team),
                    None => None,
                };
                if drawer_team.is_none() || participant.team != drawer_team {
                    self.send_error(socket_id, ErrorCode::WrongTeam).await;
                    return;
                }
                drawer_team
            }
            GameMode::Solo => None,
        };

        let correct = guess.trim().to_lowercase() == word.trim().to_lowercase();
        if !correct {
            self.broadcast_to_room(
                room.id,
                ServerEvent::IncorrectGuess {
                    user_id,
                    guess: guess.trim().to_string(),
                },
            )
            .await;
            self.send_to_socket(
                socket_id,
                ServerEvent::GuessResult {
                    correct: false,
                    reward: 0,
                },
            )
            .await;
            return;
        }

        self.metrics.increment_correct_guesses();
        let reward = guess_reward(room.remaining_seconds(Utc::now()));

        match room.game_mode {
            GameMode::Solo => {
                self.award_solo_guess(socket_id, user_id, room.id, reward, room.settings.target_points)
                    .await;
            }
            GameMode::Team => {
                // drawer_team is Some here; the gate above rejected the rest.
                if let Some(team) = drawer_team {
                    self.award_team_guess(socket_id, user_id, room.id, team, reward)
                        .await;
                }
            }
        }
    }

    async fn award_solo_guess(
        self: &Arc<Self>,
        socket_id: SocketId,
        user_id: UserId,
        room_id: RoomId,
        reward: u32,
        target_points: u32,
    ) {
        let score = match self.store().award_player(room_id, user_id, reward, true).await {
            Ok(Some(score)) => score,
            Ok(None) => return,
            Err(err) => {
                tracing::error!(error = %err, "Failed to award guess");
                return;
            }
        };

        let remaining = match self.remaining_guessers(room_id).await {
            Ok(remaining) => remaining,
            Err(err) => {
                tracing::error!(error = %err, "Failed to count remaining guessers");
                0
            }
        };

        self.broadcast_to_room(
            room_id,
            ServerEvent::CorrectGuess {
                user_id,
                reward,
                remaining_guessers: remaining,
            },
        )
        .await;
        self.broadcast_to_room(room_id, ServerEvent::ScoreUpdate { user_id, score })
            .await;
        self.send_to_socket(
            socket_id,
            ServerEvent::GuessResult {
                correct: true,
                reward,
            },
        )
        .await;

        let target_reached = self
            .target_reached(room_id, target_points)
            .await
            .unwrap_or(false);
        if remaining == 0 || target_reached {
            if let Err(err) = self
                .end_drawing_round(room_id, DrawingEndReason::AllGuessed)
                .await
            {
                tracing::error!(room_id, error = %err, "Failed to end round after guess");
            }
        }
    }

    /// Team mode: the first correct guess awards every active teammate
    /// exactly once, then ends the round immediately.
    async fn award_team_guess(
        self: &Arc<Self>,
        socket_id: SocketId,
        user_id: UserId,
        room_id: RoomId,
        team: Team,
        reward: u32,
    ) {
        let awards = match self
            .retry()
            .execute("award_team", || {
                self.store().award_team(room_id, team, reward)
            })
            .await
        {
            Ok(Some(awards)) => awards,
            Ok(None) => {
                // A teammate's guess landed first.
                self.send_error(socket_id, ErrorCode::RoundEnded).await;
                return;
            }
            Err(err) => {
                tracing::error!(error = %err, "Team award failed");
                return;
            }
        };

        self.broadcast_to_room(
            room_id,
            ServerEvent::CorrectGuess {
                user_id,
                reward,
                remaining_guessers: 0,
            },
        )
        .await;
        for (member, score) in &awards {
            self.broadcast_to_room(
                room_id,
                ServerEvent::ScoreUpdate {
                    user_id: *member,
                    score: *score,
                },
            )
            .await;
        }
        self.send_to_socket(
            socket_id,
            ServerEvent::GuessResult {
                correct: true,
                reward,
            },
        )
        .await;

        if let Err(err) = self
            .end_drawing_round(room_id, DrawingEndReason::TeamFirstCorrect)
            .await
        {
            tracing::error!(room_id, error = %err, "Failed to end round after team guess");
        }
    }

    /// Eligible non-drawer participants still to guess this round.
    async fn remaining_guessers(&self, room_id: RoomId) -> anyhow::Result<u32> {
        let participants = self.store().participants(room_id).await?;
        Ok(participants
            .iter()
            .filter(|p| {
                p.is_active && !p.is_banned() && !p.is_drawer && !p.has_guessed_this_round
            })
            .count() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn participant(user_id: UserId, score: u32, offset_ms: i64) -> Participant {
        let mut p = Participant::new(1, user_id, None);
        p.score = score;
        p.points_updated_at = Utc::now() + Duration::milliseconds(offset_ms);
        p
    }

    fn team_participant(user_id: UserId, team: Team, score: u32) -> Participant {
        let mut p = Participant::new(1, user_id, Some(team));
        p.score = score;
        p
    }

    #[test]
    fn test_guess_reward_formula() {
        // remaining 50s -> ceil(50/8) = 7 (E1)
        assert_eq!(guess_reward(50), 7);
        // remaining 60s -> ceil(60/8) = 8 (E2)
        assert_eq!(guess_reward(60), 8);
        assert_eq!(guess_reward(0), 0);
        assert_eq!(guess_reward(1), 1);
        // capped at the per-round maximum
        assert_eq!(guess_reward(10_000), MAX_POINTS_PER_ROUND);
    }

    #[test]
    fn test_drawer_reward_formula() {
        // G=1, N=3 -> 20*1/2 = 10 (E1)
        assert_eq!(drawer_reward(1, 3), 10);
        // G=2, N=3 -> 20*2/2 = 20
        assert_eq!(drawer_reward(2, 3), 20);
        // G=0 -> nothing
        assert_eq!(drawer_reward(0, 3), 0);
        // two-player room: N-1 = 1
        assert_eq!(drawer_reward(1, 2), 20);
        // never exceeds the cap
        assert_eq!(drawer_reward(5, 2), MAX_POINTS_PER_ROUND);
        // degenerate single-player denominator clamps to 1
        assert_eq!(drawer_reward(1, 1), 20);
    }

    #[test]
    fn test_solo_rankings_strictly_unique() {
        let participants = vec![
            participant(1, 40, 0),
            participant(2, 60, 10),
            participant(3, 60, 5), // same score as 2, awarded earlier
        ];
        let rankings = compute_rankings(GameMode::Solo, 10, &participants);
        let order: Vec<UserId> = rankings.iter().map(|r| r.user_id).collect();
        // 3 beats 2 on the earlier tie-break timestamp.
        assert_eq!(order, vec![3, 2, 1]);
        let ranks: Vec<u32> = rankings.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_solo_rewards_three_or_more() {
        let participants = vec![
            participant(1, 70, 0),
            participant(2, 50, 0),
            participant(3, 30, 0),
            participant(4, 10, 0),
        ];
        let rankings = compute_rankings(GameMode::Solo, 10, &participants);
        let rewards: Vec<u32> = rankings.iter().map(|r| r.reward).collect();
        assert_eq!(rewards, vec![30, 20, 10, 0]);
    }

    #[test]
    fn test_solo_rewards_two_players() {
        let participants = vec![participant(1, 70, 0), participant(2, 50, 0)];
        let rankings = compute_rankings(GameMode::Solo, 10, &participants);
        assert_eq!(rankings[0].reward, 20);
        assert_eq!(rankings[1].reward, 0);
    }

    #[test]
    fn test_team_rankings_winner_takes_double_entry() {
        let participants = vec![
            team_participant(1, Team::Blue, 30),
            team_participant(2, Team::Blue, 20),
            team_participant(3, Team::Orange, 25),
            team_participant(4, Team::Orange, 15),
        ];
        let rankings = compute_rankings(GameMode::Team, 10, &participants);
        for entry in &rankings {
            match entry.team {
                Some(Team::Blue) => {
                    assert_eq!(entry.rank, 1);
                    assert_eq!(entry.reward, 20);
                }
                Some(Team::Orange) => {
                    assert_eq!(entry.rank, 2);
                    assert_eq!(entry.reward, 0);
                }
                None => panic!("team game without team"),
            }
        }
    }

    #[test]
    fn test_team_tie_pays_nobody() {
        let participants = vec![
            team_participant(1, Team::Blue, 20),
            team_participant(2, Team::Orange, 20),
        ];
        let rankings = compute_rankings(GameMode::Team, 10, &participants);
        assert!(rankings.iter().all(|r| r.reward == 0));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn guess_reward_never_exceeds_cap(remaining in 0u64..100_000) {
                prop_assert!(guess_reward(remaining) <= MAX_POINTS_PER_ROUND);
            }

            #[test]
            fn guess_reward_is_monotonic(a in 0u64..10_000, b in 0u64..10_000) {
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                prop_assert!(guess_reward(lo) <= guess_reward(hi));
            }

            #[test]
            fn drawer_reward_bounded(guessed in 0u32..64, players in 0u32..64) {
                prop_assert!(drawer_reward(guessed, players) <= MAX_POINTS_PER_ROUND);
            }

            /// Solo ranks are the strict sequence 1..N regardless of
            /// score ties, because the award timestamp (and finally the
            /// user id) breaks them.
            #[test]
            fn solo_ranks_are_strictly_unique(
                scores in proptest::collection::vec(0u32..100, 2..10)
            ) {
                let participants: Vec<Participant> = scores
                    .iter()
                    .enumerate()
                    .map(|(i, score)| participant(i as UserId + 1, *score, i as i64))
                    .collect();
                let rankings = compute_rankings(GameMode::Solo, 5, &participants);
                let mut ranks: Vec<u32> = rankings.iter().map(|r| r.rank).collect();
                ranks.sort_unstable();
                let expected: Vec<u32> = (1..=scores.len() as u32).collect();
                prop_assert_eq!(ranks, expected);
            }

            /// Higher (score, earlier-award) never ranks below a
            /// strictly worse participant.
            #[test]
            fn solo_ranking_respects_sort_key(
                scores in proptest::collection::vec(0u32..100, 2..10)
            ) {
                let participants: Vec<Participant> = scores
                    .iter()
                    .enumerate()
                    .map(|(i, score)| participant(i as UserId + 1, *score, i as i64))
                    .collect();
                let rankings = compute_rankings(GameMode::Solo, 5, &participants);
                for pair in rankings.windows(2) {
                    prop_assert!(pair[0].score >= pair[1].score);
                    prop_assert!(pair[0].rank < pair[1].rank);
                }
            }
        }
    }
}
