//! Source of automated opponents for the matchmaker
//!
//! Synthesis happens while the matchmaker holds the registry lock, so the
//! provider interface is synchronous and must not block.

use crate::bot::computer::{ComputerPlayer, COMPUTER_PLAYER_NAME};
use crate::player::Player;
use crate::types::Difficulty;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Trait for synthesizing automated opponents
pub trait OpponentProvider: Send + Sync {
    /// Create a fresh automated participant at the given tier
    fn synthesize(&self, difficulty: Difficulty) -> Arc<dyn Player>;

    /// Number of opponents synthesized so far
    fn synthesized_count(&self) -> u64;
}

/// Provider that hands out `ComputerPlayer`s
#[derive(Debug)]
pub struct ComputerOpponentProvider {
    name: String,
    synthesized: AtomicU64,
}

impl ComputerOpponentProvider {
    pub fn new() -> Self {
        Self::with_name(COMPUTER_PLAYER_NAME)
    }

    /// Use a custom display name for every synthesized opponent
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            synthesized: AtomicU64::new(0),
        }
    }
}

impl Default for ComputerOpponentProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OpponentProvider for ComputerOpponentProvider {
    fn synthesize(&self, difficulty: Difficulty) -> Arc<dyn Player> {
        let count = self.synthesized.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            "Synthesized automated opponent #{} ('{}', {})",
            count, self.name, difficulty
        );
        Arc::new(ComputerPlayer::with_name(self.name.clone(), difficulty))
    }

    fn synthesized_count(&self) -> u64 {
        self.synthesized.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesize_matches_tier() {
        let provider = ComputerOpponentProvider::new();

        let easy = provider.synthesize(Difficulty::Easy);
        let hard = provider.synthesize(Difficulty::Hard);

        assert_eq!(easy.difficulty(), Difficulty::Easy);
        assert_eq!(hard.difficulty(), Difficulty::Hard);
        assert!(!easy.is_human());
        assert_eq!(easy.name(), COMPUTER_PLAYER_NAME);
        assert_eq!(provider.synthesized_count(), 2);
    }

    #[test]
    fn test_custom_name() {
        let provider = ComputerOpponentProvider::with_name("Marble Bot");
        assert_eq!(provider.synthesize(Difficulty::Hard).name(), "Marble Bot");
    }
}
