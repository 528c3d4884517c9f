//! Nim Lobby - matchmaking and match hosting for the game of Nim
//!
//! This crate accepts participants over AMQP, pairs them by difficulty tier
//! and opponent preference, synthesizes computer opponents on request, and
//! runs every match on its own task.

pub mod amqp;
pub mod bot;
pub mod config;
pub mod error;
pub mod game;
pub mod lobby;
pub mod metrics;
pub mod player;
pub mod service;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MatchmakingError, PlayerError, Result, TransportError};
pub use types::*;

// Re-export key components
pub use amqp::publisher::EventPublisher;
pub use bot::{ComputerPlayer, OpponentProvider};
pub use game::{EngineConfig, MatchEngine, MatchReport};
pub use lobby::{Matchmaker, MatchmakerConfig, ParticipantRegistry};
pub use player::{HumanPlayer, Player, RemoteClient};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
