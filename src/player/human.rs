//! Human participant reached through a `RemoteClient`

use crate::error::{PlayerError, PlayerResult};
use crate::player::remote::RemoteClient;
use crate::player::{Player, SeatState};
use crate::types::{Difficulty, LobbyMessage, OpponentKind, ParticipantId};
use crate::utils::{is_legal_take, max_take};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Preferences captured when a human joins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub name: String,
    pub difficulty: Difficulty,
    pub opponent: OpponentKind,
}

pub struct HumanPlayer {
    profile: PlayerProfile,
    client: Arc<dyn RemoteClient>,
    seat: SeatState,
    max_move_attempts: u32,
}

impl HumanPlayer {
    pub fn new(
        profile: PlayerProfile,
        client: Arc<dyn RemoteClient>,
        max_move_attempts: u32,
    ) -> Self {
        Self {
            profile,
            client,
            seat: SeatState::new(),
            max_move_attempts: max_move_attempts.max(1),
        }
    }

    pub fn profile(&self) -> &PlayerProfile {
        &self.profile
    }
}

impl std::fmt::Debug for HumanPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HumanPlayer")
            .field("profile", &self.profile)
            .field("participant_id", &self.seat.participant_id())
            .field("in_match", &self.seat.in_match())
            .finish()
    }
}

#[async_trait]
impl Player for HumanPlayer {
    fn name(&self) -> &str {
        &self.profile.name
    }

    fn is_human(&self) -> bool {
        true
    }

    fn preferred_opponent(&self) -> OpponentKind {
        self.profile.opponent
    }

    fn difficulty(&self) -> Difficulty {
        self.profile.difficulty
    }

    fn participant_id(&self) -> Option<ParticipantId> {
        self.seat.participant_id()
    }

    fn set_participant_id(&self, id: ParticipantId) {
        self.seat.set_participant_id(id);
    }

    fn in_match(&self) -> bool {
        self.seat.in_match()
    }

    fn set_in_match(&self, in_match: bool) {
        self.seat.set_in_match(in_match);
    }

    /// Re-asks the client until it answers within 1..=pool/2, giving up after
    /// `max_move_attempts` out-of-range answers
    async fn choose_move(&self, pool: u32) -> PlayerResult<u32> {
        let limit = max_take(pool);
        if limit == 0 {
            return Err(PlayerError::PoolTooSmall { pool });
        }

        let mut last_take = 0;
        for attempt in 1..=self.max_move_attempts {
            let take = self.client.request_move(pool).await?;
            if is_legal_take(take, pool) {
                return Ok(take);
            }

            warn!(
                "Participant '{}' answered {} for a pool of {} (attempt {}/{})",
                self.profile.name, take, pool, attempt, self.max_move_attempts
            );
            last_take = take;

            let reminder = LobbyMessage::InvalidMove {
                take,
                max_take: limit,
            };
            if let Err(e) = self.client.deliver(reminder).await {
                debug!(
                    "Could not tell '{}' about the invalid move: {}",
                    self.profile.name, e
                );
            }
        }

        Err(PlayerError::IllegalMove {
            take: last_take,
            pool,
        })
    }

    async fn notify(&self, message: LobbyMessage) -> PlayerResult<()> {
        self.client.deliver(message).await?;
        Ok(())
    }

    async fn wants_rematch(&self) -> PlayerResult<bool> {
        Ok(self.client.ask_rematch().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::player::remote::MockRemoteClient;

    fn profile() -> PlayerProfile {
        PlayerProfile {
            name: "alice".to_string(),
            difficulty: Difficulty::Easy,
            opponent: OpponentKind::Human,
        }
    }

    #[tokio::test]
    async fn test_legal_move_is_returned() {
        let mut client = MockRemoteClient::new();
        client.expect_request_move().times(1).returning(|_| Ok(4));

        let player = HumanPlayer::new(profile(), Arc::new(client), 3);
        assert_eq!(player.choose_move(10).await, Ok(4));
    }

    #[tokio::test]
    async fn test_illegal_move_is_asked_again() {
        let mut client = MockRemoteClient::new();
        let mut calls = 0;
        client.expect_request_move().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(9)
            } else {
                Ok(2)
            }
        });
        client
            .expect_deliver()
            .withf(|message| matches!(message, LobbyMessage::InvalidMove { take: 9, max_take: 5 }))
            .times(1)
            .returning(|_| Ok(()));

        let player = HumanPlayer::new(profile(), Arc::new(client), 3);
        assert_eq!(player.choose_move(10).await, Ok(2));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let mut client = MockRemoteClient::new();
        client.expect_request_move().times(2).returning(|_| Ok(0));
        client
            .expect_deliver()
            .times(2)
            .returning(|_| Err(TransportError::Closed));

        let player = HumanPlayer::new(profile(), Arc::new(client), 2);
        assert_eq!(
            player.choose_move(6).await,
            Err(PlayerError::IllegalMove { take: 0, pool: 6 })
        );
    }

    #[tokio::test]
    async fn test_transport_failure_is_surfaced() {
        let mut client = MockRemoteClient::new();
        client
            .expect_request_move()
            .returning(|_| Err(TransportError::Timeout { timeout_ms: 100 }));
        client
            .expect_ask_rematch()
            .returning(|| Err(TransportError::Closed));

        let player = HumanPlayer::new(profile(), Arc::new(client), 3);
        let err = player.choose_move(10).await.unwrap_err();
        assert!(err.is_transport());
        assert!(player.wants_rematch().await.unwrap_err().is_transport());
    }

    #[tokio::test]
    async fn test_win_and_loss_are_delivered() {
        let mut client = MockRemoteClient::new();
        client
            .expect_deliver()
            .withf(|message| *message == LobbyMessage::Won)
            .times(1)
            .returning(|_| Ok(()));
        client
            .expect_deliver()
            .withf(|message| *message == LobbyMessage::Lost)
            .times(1)
            .returning(|_| Ok(()));

        let player = HumanPlayer::new(profile(), Arc::new(client), 3);
        assert!(player.notify_win().await.is_ok());
        assert!(player.notify_loss().await.is_ok());
    }

    #[test]
    fn test_profile_accessors() {
        let player = HumanPlayer::new(profile(), Arc::new(MockRemoteClient::new()), 3);
        assert_eq!(player.name(), "alice");
        assert!(player.is_human());
        assert_eq!(player.preferred_opponent(), OpponentKind::Human);
        assert_eq!(player.difficulty(), Difficulty::Easy);
        assert_eq!(player.participant_id(), None);
    }
}
