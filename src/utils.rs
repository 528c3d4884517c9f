//! Utility functions for the lobby service

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique match ID
pub fn generate_match_id() -> Uuid {
    Uuid::new_v4()
}

/// Generate a correlation ID for a remote call
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Largest number of marbles a move may take from `pool`
pub fn max_take(pool: u32) -> u32 {
    pool / 2
}

/// Whether taking `take` from `pool` respects the move contract
pub fn is_legal_take(take: u32, pool: u32) -> bool {
    take >= 1 && take <= max_take(pool)
}
