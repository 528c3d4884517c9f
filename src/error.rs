//! Error types for the lobby service
//!
//! Lobby-level failures use `MatchmakingError` wrapped in anyhow, while the
//! player boundary has its own typed errors so the match engine can tell a
//! dropped connection apart from a broken move contract.

use crate::types::ParticipantId;

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Result type for calls made through the `Player` capability
pub type PlayerResult<T> = std::result::Result<T, PlayerError>;

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("Invalid intake request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Participant not found: {participant_id}")]
    ParticipantNotFound { participant_id: ParticipantId },

    #[error("Participant {participant_id} is already queued or in a match")]
    AlreadyQueued { participant_id: ParticipantId },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

/// Failures of the remote-call transport used to reach a human participant
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("Participant unreachable: {details}")]
    Unreachable { details: String },

    #[error("Remote call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Malformed reply: {details}")]
    MalformedReply { details: String },

    #[error("Transport closed")]
    Closed,
}

/// Errors surfaced through the `Player` capability
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlayerError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Pool of {pool} is too small to move from")]
    PoolTooSmall { pool: u32 },

    #[error("Illegal move of {take} from a pool of {pool}")]
    IllegalMove { take: u32, pool: u32 },
}

impl PlayerError {
    /// Whether the failure came from the transport rather than the move contract
    pub fn is_transport(&self) -> bool {
        matches!(self, PlayerError::Transport(_))
    }
}
