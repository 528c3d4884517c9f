//! Automated opponents
//!
//! A participant that prefers an automated opponent is paired with a
//! `ComputerPlayer` synthesized on the spot at the same difficulty tier.

pub mod computer;
pub mod provider;
pub mod strategy;

// Re-export commonly used types
pub use computer::{ComputerPlayer, COMPUTER_PLAYER_NAME};
pub use provider::{ComputerOpponentProvider, OpponentProvider};
pub use strategy::choose_take;
