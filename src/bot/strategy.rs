//! Move heuristic for automated opponents
//!
//! Hard play steers the pool toward one less than a power of two, the losing
//! positions of misère Nim with the take-at-most-half rule. Easy play and hard
//! play from an already losing position both fall back to a random legal take.

use crate::error::{PlayerError, PlayerResult};
use crate::types::Difficulty;
use crate::utils::max_take;
use rand::Rng;
use tracing::error;

/// Choose how many marbles to take from `pool`
///
/// The pool must hold at least two marbles; anything smaller means the caller
/// broke the match contract and is reported as `PoolTooSmall`.
pub fn choose_take<R: Rng + ?Sized>(
    pool: u32,
    difficulty: Difficulty,
    rng: &mut R,
) -> PlayerResult<u32> {
    if pool < 2 {
        error!(
            "Automated strategy asked to move from a pool of {} marbles",
            pool
        );
        return Err(PlayerError::PoolTooSmall { pool });
    }

    let limit = max_take(pool);
    let take = match difficulty {
        Difficulty::Easy => rng.gen_range(1..=limit),
        Difficulty::Hard => {
            let pot = largest_power_of_two(pool);
            if u64::from(pool) == 2 * u64::from(pot) - 1 {
                rng.gen_range(1..=limit)
            } else {
                pool - pot + 1
            }
        }
    };

    Ok(take)
}

/// Largest power of two that is `<= pool`, for `pool >= 1`
fn largest_power_of_two(pool: u32) -> u32 {
    1 << (u32::BITS - 1 - pool.leading_zeros())
}
