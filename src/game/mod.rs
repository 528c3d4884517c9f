//! Match execution
//!
//! Each pairing produced by the matchmaker runs in its own engine task.

pub mod engine;

pub use engine::{EngineConfig, MatchEngine, MatchReport, MatchState, RematchAnswer, SeatReport};
