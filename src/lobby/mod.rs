//! Participant registry, waiting queue and matchmaking
//!
//! Participants are registered and queued here, paired in queue order by the
//! matchmaker and handed to the match engine.

pub mod matching;
pub mod matchmaker;
pub mod registry;

// Re-export commonly used types
pub use matching::{Matcher, Pairing, QueueOrderMatcher, ScanResult};
pub use matchmaker::{CycleReport, LaunchedMatch, Matchmaker, MatchmakerConfig, MatchmakerStats};
pub use registry::{LobbyTables, ParticipantRegistry, WaitingEntry};
