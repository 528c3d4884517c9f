//! Player abstraction shared by remote humans and synthesized bots
//!
//! The matchmaker and the match engine only ever talk to `Arc<dyn Player>`.
//! Each implementation owns its identifier and in-match flag so a handle can be
//! shared between the registry, the waiting queue and a running match.

pub mod human;
pub mod remote;

pub use human::{HumanPlayer, PlayerProfile};
pub use remote::RemoteClient;

use crate::error::PlayerResult;
use crate::types::{Difficulty, LobbyMessage, OpponentKind, ParticipantId};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Capability interface for anything that can sit at a Nim table
#[async_trait]
pub trait Player: Send + Sync {
    /// Display name
    fn name(&self) -> &str;

    fn is_human(&self) -> bool;

    /// Kind of opponent this participant wants to face
    fn preferred_opponent(&self) -> OpponentKind;

    fn difficulty(&self) -> Difficulty;

    /// Registry identifier, `None` until registered
    fn participant_id(&self) -> Option<ParticipantId>;

    fn set_participant_id(&self, id: ParticipantId);

    fn in_match(&self) -> bool;

    fn set_in_match(&self, in_match: bool);

    /// Number of marbles taken from `pool` this turn
    async fn choose_move(&self, pool: u32) -> PlayerResult<u32>;

    /// Push an informational message to the participant
    async fn notify(&self, message: LobbyMessage) -> PlayerResult<()>;

    async fn notify_win(&self) -> PlayerResult<()> {
        self.notify(LobbyMessage::Won).await
    }

    async fn notify_loss(&self) -> PlayerResult<()> {
        self.notify(LobbyMessage::Lost).await
    }

    /// Whether the participant wants to be queued again after a match
    async fn wants_rematch(&self) -> PlayerResult<bool>;
}

/// Identifier and in-match flag held by every `Player` implementation
#[derive(Debug, Default)]
pub struct SeatState {
    // 0 means unassigned, the registry hands out ids starting at 1
    participant_id: AtomicU64,
    in_match: AtomicBool,
}

impl SeatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn participant_id(&self) -> Option<ParticipantId> {
        match self.participant_id.load(Ordering::Acquire) {
            0 => None,
            id => Some(id),
        }
    }

    pub fn set_participant_id(&self, id: ParticipantId) {
        self.participant_id.store(id, Ordering::Release);
    }

    pub fn in_match(&self) -> bool {
        self.in_match.load(Ordering::Acquire)
    }

    pub fn set_in_match(&self, in_match: bool) {
        self.in_match.store(in_match, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seat_state_defaults() {
        let seat = SeatState::new();
        assert_eq!(seat.participant_id(), None);
        assert!(!seat.in_match());

        seat.set_participant_id(42);
        seat.set_in_match(true);
        assert_eq!(seat.participant_id(), Some(42));
        assert!(seat.in_match());
    }
}
