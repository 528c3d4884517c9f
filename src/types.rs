//! Common types used throughout the lobby service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier handed out by the participant registry
pub type ParticipantId = u64;

/// Unique identifier for matches
pub type MatchId = Uuid;

/// Difficulty tier shared by both sides of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Hard,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

/// Kind of opponent a participant asked to be matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpponentKind {
    Human,
    Automated,
}

impl std::fmt::Display for OpponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpponentKind::Human => write!(f, "human"),
            OpponentKind::Automated => write!(f, "automated"),
        }
    }
}

/// Informational messages pushed to a participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LobbyMessage {
    Registered {
        participant_id: ParticipantId,
    },
    AwaitingOpponent,
    OpponentFound {
        opponent: String,
    },
    MatchStarting {
        pool: u32,
        first_mover: String,
    },
    MoveMade {
        by: String,
        taken: u32,
        remaining: u32,
    },
    InvalidMove {
        take: u32,
        max_take: u32,
    },
    Won,
    Lost,
    Leaving,
}

impl std::fmt::Display for LobbyMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LobbyMessage::Registered { participant_id } => {
                write!(f, "Registered as participant {}", participant_id)
            }
            LobbyMessage::AwaitingOpponent => write!(f, "Awaiting opponent..."),
            LobbyMessage::OpponentFound { opponent } => {
                write!(f, "Opponent found - you are playing {}", opponent)
            }
            LobbyMessage::MatchStarting { pool, first_mover } => write!(
                f,
                "Starting with {} marbles, {} moves first",
                pool, first_mover
            ),
            LobbyMessage::MoveMade {
                by,
                taken,
                remaining,
            } => write!(
                f,
                "{} has taken {} marbles, leaving {}",
                by, taken, remaining
            ),
            LobbyMessage::InvalidMove { take, max_take } => write!(
                f,
                "Cannot take {} marbles, choose between 1 and {}",
                take, max_take
            ),
            LobbyMessage::Won => write!(f, "You won!"),
            LobbyMessage::Lost => write!(f, "You lost."),
            LobbyMessage::Leaving => write!(f, "Leaving server."),
        }
    }
}

/// Request to join the lobby
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub name: String,
    pub difficulty: Difficulty,
    pub opponent: OpponentKind,
    /// Queue the participant's client listens on for calls from the lobby
    pub client_queue: String,
    pub timestamp: DateTime<Utc>,
}

/// Request to leave the lobby
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub participant_id: ParticipantId,
    pub timestamp: DateTime<Utc>,
}

/// Request to go back into the waiting queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequeueRequest {
    pub participant_id: ParticipantId,
    pub timestamp: DateTime<Utc>,
}

/// Union type for all inbound intake messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IntakeRequest {
    Join(JoinRequest),
    Leave(LeaveRequest),
    Requeue(RequeueRequest),
}

/// Why a participant left the lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaveReason {
    /// Declined a rematch
    Declined,
    /// Asked to leave through intake
    Requested,
    /// Could not be asked about a rematch
    Unreachable,
}

/// How a match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOutcome {
    Won,
    Abandoned,
}

impl std::fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchOutcome::Won => write!(f, "won"),
            MatchOutcome::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Public view of one side of a match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSeat {
    /// `None` for synthesized automated opponents, which are never registered
    pub participant_id: Option<ParticipantId>,
    pub name: String,
    pub is_human: bool,
}

/// Event emitted when a participant registers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantJoined {
    pub participant_id: ParticipantId,
    pub name: String,
    pub difficulty: Difficulty,
    pub opponent: OpponentKind,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a participant is removed from the lobby
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantLeft {
    pub participant_id: ParticipantId,
    pub reason: LeaveReason,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a pairing launches a match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchStarted {
    pub match_id: MatchId,
    pub difficulty: Difficulty,
    pub seats: Vec<MatchSeat>,
    pub timestamp: DateTime<Utc>,
}

/// Event emitted when a match reaches a terminal state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchFinished {
    pub match_id: MatchId,
    pub outcome: MatchOutcome,
    pub winner: Option<String>,
    pub turns: u32,
    pub timestamp: DateTime<Utc>,
}

/// Union type for all outbound lobby events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LobbyEvent {
    ParticipantJoined(ParticipantJoined),
    ParticipantLeft(ParticipantLeft),
    MatchStarted(MatchStarted),
    MatchFinished(MatchFinished),
}
