//! Pairing algorithms for the waiting queue
//!
//! A matcher runs under the registry lock with mutable access to the lobby
//! tables. It marks the entries it pairs as claimed and removes them in bulk
//! before returning.

use crate::bot::provider::OpponentProvider;
use crate::lobby::registry::LobbyTables;
use crate::player::Player;
use crate::types::{Difficulty, OpponentKind};
use std::sync::Arc;
use tracing::{debug, warn};

/// Two participants that should play each other
#[derive(Clone)]
pub struct Pairing {
    /// The earlier of the two entries in queue order
    pub first: Arc<dyn Player>,
    pub second: Arc<dyn Player>,
    pub difficulty: Difficulty,
    /// Whether `second` was synthesized for this pairing
    pub synthesized_opponent: bool,
}

impl Pairing {
    pub fn opponent_kind(&self) -> OpponentKind {
        if self.synthesized_opponent {
            OpponentKind::Automated
        } else {
            OpponentKind::Human
        }
    }
}

impl std::fmt::Debug for Pairing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pairing")
            .field("first", &self.first.name())
            .field("second", &self.second.name())
            .field("difficulty", &self.difficulty)
            .field("synthesized_opponent", &self.synthesized_opponent)
            .finish()
    }
}

/// Result of one scan over the waiting queue
#[derive(Debug, Default)]
pub struct ScanResult {
    pub pairings: Vec<Pairing>,
    /// Entries dropped because their participant was gone or already playing
    pub stale_entries: usize,
}

/// Trait for pairing algorithms
pub trait Matcher: Send + Sync {
    /// Pair up waiting entries and remove the claimed ones
    fn pair(&self, tables: &mut LobbyTables, opponents: &dyn OpponentProvider) -> ScanResult;
}

/// First-unclaimed-in-queue-order matcher
///
/// Each unclaimed entry, in order, either gets a synthesized opponent (if it
/// prefers one) or is paired with the first later unclaimed entry that has
/// the same tier and the same opponent preference. Entries without a partner
/// stay queued for the next scan.
#[derive(Debug, Default)]
pub struct QueueOrderMatcher;

impl QueueOrderMatcher {
    pub fn new() -> Self {
        Self
    }

    fn compatible(a: &dyn Player, b: &dyn Player) -> bool {
        a.difficulty() == b.difficulty() && a.preferred_opponent() == b.preferred_opponent()
    }
}

impl Matcher for QueueOrderMatcher {
    fn pair(&self, tables: &mut LobbyTables, opponents: &dyn OpponentProvider) -> ScanResult {
        let mut result = ScanResult::default();
        let len = tables.waiting.len();

        for i in 0..len {
            if tables.waiting[i].claimed {
                continue;
            }

            let id = tables.waiting[i].participant_id;
            let player = match tables.participants.get(&id) {
                Some(player) if !player.in_match() => player.clone(),
                Some(_) => {
                    warn!("Dropping waiting entry for participant {} already in a match", id);
                    tables.waiting[i].claimed = true;
                    result.stale_entries += 1;
                    continue;
                }
                None => {
                    debug!("Dropping waiting entry for removed participant {}", id);
                    tables.waiting[i].claimed = true;
                    result.stale_entries += 1;
                    continue;
                }
            };

            match player.preferred_opponent() {
                OpponentKind::Automated => {
                    let opponent = opponents.synthesize(player.difficulty());
                    tables.waiting[i].claimed = true;
                    debug!(
                        "Paired participant {} ('{}') with automated opponent '{}'",
                        id,
                        player.name(),
                        opponent.name()
                    );
                    result.pairings.push(Pairing {
                        difficulty: player.difficulty(),
                        first: player,
                        second: opponent,
                        synthesized_opponent: true,
                    });
                }
                OpponentKind::Human => {
                    let partner = (i + 1..len).find_map(|j| {
                        let entry = &tables.waiting[j];
                        if entry.claimed || entry.participant_id == id {
                            return None;
                        }
                        tables
                            .participants
                            .get(&entry.participant_id)
                            .filter(|candidate| {
                                !candidate.in_match()
                                    && Self::compatible(player.as_ref(), candidate.as_ref())
                            })
                            .map(|candidate| (j, candidate.clone()))
                    });

                    if let Some((j, partner)) = partner {
                        tables.waiting[i].claimed = true;
                        tables.waiting[j].claimed = true;
                        debug!(
                            "Paired participant {} ('{}') with participant {} ('{}')",
                            id,
                            player.name(),
                            tables.waiting[j].participant_id,
                            partner.name()
                        );
                        result.pairings.push(Pairing {
                            difficulty: player.difficulty(),
                            first: player,
                            second: partner,
                            synthesized_opponent: false,
                        });
                    }
                }
            }
        }

        tables.remove_claimed();
        result
    }
}
