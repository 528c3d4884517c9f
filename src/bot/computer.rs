//! Locally synthesized automated opponent

use crate::bot::strategy::choose_take;
use crate::error::PlayerResult;
use crate::player::{Player, SeatState};
use crate::types::{Difficulty, LobbyMessage, OpponentKind, ParticipantId};
use async_trait::async_trait;

/// Default display name for synthesized opponents
pub const COMPUTER_PLAYER_NAME: &str = "Computer Player";

/// Automated participant that never touches the network
///
/// It is never registered, so it has no participant id. Notifications are
/// dropped and it always declines a rematch.
#[derive(Debug)]
pub struct ComputerPlayer {
    name: String,
    difficulty: Difficulty,
    seat: SeatState,
}

impl ComputerPlayer {
    pub fn new(difficulty: Difficulty) -> Self {
        Self::with_name(COMPUTER_PLAYER_NAME, difficulty)
    }

    pub fn with_name(name: impl Into<String>, difficulty: Difficulty) -> Self {
        Self {
            name: name.into(),
            difficulty,
            seat: SeatState::new(),
        }
    }
}

#[async_trait]
impl Player for ComputerPlayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_human(&self) -> bool {
        false
    }

    // Only ever seated opposite the human that asked for it
    fn preferred_opponent(&self) -> OpponentKind {
        OpponentKind::Human
    }

    fn difficulty(&self) -> Difficulty {
        self.difficulty
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

    async fn choose_move(&self, pool: u32) -> PlayerResult<u32> {
        let mut rng = rand::thread_rng();
        choose_take(pool, self.difficulty, &mut rng)
    }

    async fn notify(&self, _message: LobbyMessage) -> PlayerResult<()> {
        Ok(())
    }

    async fn wants_rematch(&self) -> PlayerResult<bool> {
        Ok(false)
    }
}
