//! Participant registry and waiting queue
//!
//! Both tables live behind one mutex. Intake operations take it briefly and
//! the matchmaker holds it for one whole scan, so a scan always sees a
//! consistent queue. Nothing awaits while the lock is held.

use crate::error::{MatchmakingError, Result};
use crate::player::Player;
use crate::types::ParticipantId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// One participant's place in the waiting queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingEntry {
    pub participant_id: ParticipantId,
    /// Set once a scan has paired this entry, cleared by bulk removal
    pub claimed: bool,
}

impl WaitingEntry {
    fn new(participant_id: ParticipantId) -> Self {
        Self {
            participant_id,
            claimed: false,
        }
    }
}

/// Live participants and the waiting queue, always accessed together
#[derive(Default)]
pub struct LobbyTables {
    pub(crate) participants: HashMap<ParticipantId, Arc<dyn Player>>,
    pub(crate) waiting: Vec<WaitingEntry>,
}

impl LobbyTables {
    pub fn participant(&self, id: ParticipantId) -> Option<&Arc<dyn Player>> {
        self.participants.get(&id)
    }

    /// Waiting entries in queue order
    pub fn waiting(&self) -> &[WaitingEntry] {
        &self.waiting
    }

    fn is_waiting(&self, id: ParticipantId) -> bool {
        self.waiting.iter().any(|entry| entry.participant_id == id)
    }

    /// Drop every entry a scan has claimed
    pub fn remove_claimed(&mut self) -> usize {
        let before = self.waiting.len();
        self.waiting.retain(|entry| !entry.claimed);
        before - self.waiting.len()
    }
}

/// Registry of live participants
pub struct ParticipantRegistry {
    tables: Mutex<LobbyTables>,
    next_id: AtomicU64,
}

impl ParticipantRegistry {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(LobbyTables::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Run `f` with exclusive access to both tables
    pub fn with_tables<T>(&self, f: impl FnOnce(&mut LobbyTables) -> T) -> Result<T> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire lobby tables lock".to_string(),
            })?;
        Ok(f(&mut tables))
    }

    /// Assign a fresh identifier, store the participant and queue it
    pub fn register(&self, player: Arc<dyn Player>) -> Result<ParticipantId> {
        // Ids come from a counter and are never reused
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        player.set_participant_id(id);

        self.with_tables(|tables| {
            info!(
                "Registering participant {} ('{}') - difficulty: {}, opponent: {}",
                id,
                player.name(),
                player.difficulty(),
                player.preferred_opponent()
            );
            tables.participants.insert(id, player);
            tables.waiting.push(WaitingEntry::new(id));
        })?;

        Ok(id)
    }

    /// Append a fresh waiting entry for a registered participant
    pub fn enqueue(&self, id: ParticipantId) -> Result<()> {
        self.with_tables(|tables| -> std::result::Result<(), MatchmakingError> {
            let player = tables
                .participants
                .get(&id)
                .ok_or(MatchmakingError::ParticipantNotFound { participant_id: id })?;

            if player.in_match() || tables.is_waiting(id) {
                return Err(MatchmakingError::AlreadyQueued { participant_id: id });
            }

            tables.waiting.push(WaitingEntry::new(id));
            debug!("Participant {} queued ({} waiting)", id, tables.waiting.len());
            Ok(())
        })?
        .map_err(Into::into)
    }

    /// Remove a participant and purge its waiting entries
    ///
    /// Returns `None` when the id is unknown, so repeated removal is harmless.
    pub fn remove(&self, id: ParticipantId) -> Result<Option<Arc<dyn Player>>> {
        self.with_tables(|tables| {
            let removed = tables.participants.remove(&id);
            if removed.is_some() {
                tables.waiting.retain(|entry| entry.participant_id != id);
                info!(
                    "Removed participant {} ({} live, {} waiting)",
                    id,
                    tables.participants.len(),
                    tables.waiting.len()
                );
            }
            removed
        })
    }

    pub fn lookup(&self, id: ParticipantId) -> Result<Option<Arc<dyn Player>>> {
        self.with_tables(|tables| tables.participants.get(&id).cloned())
    }

    pub fn participant_count(&self) -> Result<usize> {
        self.with_tables(|tables| tables.participants.len())
    }

    pub fn waiting_count(&self) -> Result<usize> {
        self.with_tables(|tables| tables.waiting.len())
    }

    /// Waiting participant ids in queue order
    pub fn waiting_ids(&self) -> Result<Vec<ParticipantId>> {
        self.with_tables(|tables| {
            tables
                .waiting
                .iter()
                .map(|entry| entry.participant_id)
                .collect()
        })
    }
}

impl Default for ParticipantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::ComputerPlayer;
    use crate::types::Difficulty;

    fn bot() -> Arc<dyn Player> {
        Arc::new(ComputerPlayer::new(Difficulty::Easy))
    }

    #[test]
    fn test_register_assigns_unique_ids_and_queues() {
        let registry = ParticipantRegistry::new();

        let a = bot();
        let id_a = registry.register(a.clone()).unwrap();
        let id_b = registry.register(bot()).unwrap();

        assert_ne!(id_a, id_b);
        assert_eq!(a.participant_id(), Some(id_a));
        assert_eq!(registry.waiting_ids().unwrap(), vec![id_a, id_b]);
        assert_eq!(registry.participant_count().unwrap(), 2);
    }

    #[test]
    fn test_ids_are_not_reused_after_removal() {
        let registry = ParticipantRegistry::new();
        let first = registry.register(bot()).unwrap();
        registry.remove(first).unwrap();

        let second = registry.register(bot()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = ParticipantRegistry::new();
        let id = registry.register(bot()).unwrap();

        assert!(registry.remove(id).unwrap().is_some());
        assert!(registry.remove(id).unwrap().is_none());
        assert!(registry.remove(9999).unwrap().is_none());
        assert!(registry.lookup(id).unwrap().is_none());
        assert_eq!(registry.waiting_count().unwrap(), 0);
    }

    #[test]
    fn test_enqueue_rejects_duplicates_and_unknown_ids() {
        let registry = ParticipantRegistry::new();
        let player = bot();
        let id = registry.register(player.clone()).unwrap();

        let err = registry.enqueue(id).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MatchmakingError>(),
            Some(MatchmakingError::AlreadyQueued { .. })
        ));

        let err = registry.enqueue(404).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MatchmakingError>(),
            Some(MatchmakingError::ParticipantNotFound { participant_id: 404 })
        ));

        // Pretend a scan claimed it and launched a match
        registry
            .with_tables(|tables| {
                tables.waiting[0].claimed = true;
                tables.remove_claimed();
            })
            .unwrap();
        player.set_in_match(true);
        assert!(registry.enqueue(id).is_err());

        player.set_in_match(false);
        registry.enqueue(id).unwrap();
        assert_eq!(registry.waiting_ids().unwrap(), vec![id]);
    }
}
