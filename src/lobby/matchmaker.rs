//! Matchmaker that pairs waiting participants and launches matches
//!
//! The matchmaker owns the intake operations (register, leave, requeue), runs
//! the recurring pairing cycle and takes participants back once their match is
//! over. Every pairing runs on its own task so a slow participant only holds up
//! its own match.

use crate::amqp::publisher::EventPublisher;
use crate::bot::provider::{ComputerOpponentProvider, OpponentProvider};
use crate::error::{MatchmakingError, Result};
use crate::game::engine::{EngineConfig, MatchEngine, MatchReport, MatchState, RematchAnswer};
use crate::lobby::matching::{Matcher, Pairing, QueueOrderMatcher};
use crate::lobby::registry::ParticipantRegistry;
use crate::metrics::MetricsCollector;
use crate::player::Player;
use crate::types::{
    LeaveReason, LobbyMessage, MatchFinished, MatchId, MatchStarted, ParticipantId,
    ParticipantJoined, ParticipantLeft,
};
use crate::utils::current_timestamp;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Statistics about matchmaker operations
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct MatchmakerStats {
    /// Total number of participants registered
    pub participants_registered: u64,
    /// Total number of participants removed
    pub participants_removed: u64,
    /// Total number of pairing cycles run
    pub cycles_run: u64,
    /// Total number of matches launched
    pub matches_started: u64,
    /// Matches that ended with a winner
    pub matches_completed: u64,
    /// Matches that ended early
    pub matches_abandoned: u64,
    /// Automated opponents created for solo participants
    pub opponents_synthesized: u64,
    /// Matches currently running
    pub active_matches: usize,
    /// Participants currently waiting
    pub participants_waiting: usize,
    /// Participants currently registered
    pub participants_live: usize,
}

/// Matchmaker settings
#[derive(Debug, Clone, PartialEq)]
pub struct MatchmakerConfig {
    /// Upper bound between two pairing cycles
    pub cycle_period: Duration,
    pub engine: EngineConfig,
}

impl Default for MatchmakerConfig {
    fn default() -> Self {
        Self {
            cycle_period: Duration::from_millis(1000),
            engine: EngineConfig::default(),
        }
    }
}

/// A match launched by one cycle
#[derive(Debug)]
pub struct LaunchedMatch {
    pub match_id: MatchId,
    /// Resolves once the match is over and its participants have been handled
    pub handle: JoinHandle<MatchReport>,
}

/// Outcome of one pairing cycle
#[derive(Debug, Default)]
pub struct CycleReport {
    pub launched: Vec<LaunchedMatch>,
    pub stale_entries: usize,
    /// Waiting entries left after the cycle
    pub waiting: usize,
}

/// The lobby's matchmaker
#[derive(Clone)]
pub struct Matchmaker {
    registry: Arc<ParticipantRegistry>,
    matcher: Arc<dyn Matcher>,
    opponents: Arc<dyn OpponentProvider>,
    event_publisher: Arc<dyn EventPublisher>,
    metrics_collector: Arc<MetricsCollector>,
    stats: Arc<RwLock<MatchmakerStats>>,
    config: MatchmakerConfig,
    /// Signalled on intake so the loop does not wait for the next tick
    wake: Arc<Notify>,
}

impl Matchmaker {
    /// Create a matchmaker with queue-order pairing and computer opponents
    pub fn new(
        event_publisher: Arc<dyn EventPublisher>,
        metrics_collector: Arc<MetricsCollector>,
        config: MatchmakerConfig,
    ) -> Self {
        Self::with_components(
            event_publisher,
            metrics_collector,
            config,
            Arc::new(QueueOrderMatcher::new()),
            Arc::new(ComputerOpponentProvider::new()),
        )
    }

    /// Create a matchmaker with a custom matcher and opponent provider
    pub fn with_components(
        event_publisher: Arc<dyn EventPublisher>,
        metrics_collector: Arc<MetricsCollector>,
        config: MatchmakerConfig,
        matcher: Arc<dyn Matcher>,
        opponents: Arc<dyn OpponentProvider>,
    ) -> Self {
        Self {
            registry: Arc::new(ParticipantRegistry::new()),
            matcher,
            opponents,
            event_publisher,
            metrics_collector,
            stats: Arc::new(RwLock::new(MatchmakerStats::default())),
            config,
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ParticipantRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &MatchmakerConfig {
        &self.config
    }

    /// Register a participant and queue it for the next cycle
    pub async fn register(&self, player: Arc<dyn Player>) -> Result<ParticipantId> {
        let id = self.registry.register(player.clone())?;

        self.update_stats(|stats| stats.participants_registered += 1)?;
        self.metrics_collector
            .record_participant_registered(player.difficulty(), player.preferred_opponent());

        let event = ParticipantJoined {
            participant_id: id,
            name: player.name().to_string(),
            difficulty: player.difficulty(),
            opponent: player.preferred_opponent(),
            timestamp: current_timestamp(),
        };
        if let Err(e) = self.event_publisher.publish_participant_joined(event).await {
            warn!("Failed to publish join event for participant {}: {}", id, e);
        }

        for message in [
            LobbyMessage::Registered { participant_id: id },
            LobbyMessage::AwaitingOpponent,
        ] {
            if let Err(e) = player.notify(message).await {
                warn!("Failed to notify participant {}: {}", id, e);
            }
        }

        self.wake.notify_one();
        Ok(id)
    }

    /// Remove a participant on its own request
    ///
    /// Unknown ids are ignored, so leaving twice is harmless. A participant
    /// that leaves mid-match plays on until the match ends but is not queued
    /// again.
    pub async fn request_leave(&self, id: ParticipantId) -> Result<Option<Arc<dyn Player>>> {
        let removed = self.release(id, LeaveReason::Requested).await?;
        if removed.is_none() {
            debug!("Leave request for unknown participant {}", id);
        }
        Ok(removed)
    }

    /// Put a registered, idle participant back in the waiting queue
    pub async fn requeue(&self, id: ParticipantId) -> Result<()> {
        self.registry.enqueue(id)?;

        if let Some(player) = self.registry.lookup(id)? {
            if let Err(e) = player.notify(LobbyMessage::AwaitingOpponent).await {
                warn!("Failed to notify participant {}: {}", id, e);
            }
        }

        self.wake.notify_one();
        Ok(())
    }

    /// Run one pairing cycle and launch a match task per pairing
    pub fn run_cycle(&self) -> Result<CycleReport> {
        let timer = self.metrics_collector.start_timer();

        let (scan, waiting, live) = self.registry.with_tables(|tables| {
            let scan = self.matcher.pair(tables, self.opponents.as_ref());
            for pairing in &scan.pairings {
                pairing.first.set_in_match(true);
                pairing.second.set_in_match(true);
            }
            (scan, tables.waiting().len(), tables.participants.len())
        })?;

        let stale_entries = scan.stale_entries;
        let synthesized = scan
            .pairings
            .iter()
            .filter(|pairing| pairing.synthesized_opponent)
            .count();
        let pairings = scan.pairings.len();

        // Counted before any task is spawned so a quick match cannot finish first
        self.update_stats(|stats| {
            stats.cycles_run += 1;
            stats.matches_started += pairings as u64;
            stats.opponents_synthesized += synthesized as u64;
            stats.active_matches += pairings;
            stats.participants_waiting = waiting;
            stats.participants_live = live;
        })?;

        let launched: Vec<LaunchedMatch> = scan
            .pairings
            .into_iter()
            .map(|pairing| self.launch(pairing))
            .collect();

        self.metrics_collector.record_cycle(timer.stop());
        self.metrics_collector.update_queue_gauges(waiting, live);

        if !launched.is_empty() || stale_entries > 0 {
            debug!(
                "Cycle launched {} match(es), dropped {} stale entries, {} still waiting",
                launched.len(),
                stale_entries,
                waiting
            );
        }

        Ok(CycleReport {
            launched,
            stale_entries,
            waiting,
        })
    }

    fn launch(&self, pairing: Pairing) -> LaunchedMatch {
        let opponent_kind = pairing.opponent_kind();
        let synthesized = pairing.synthesized_opponent;

        let engine = MatchEngine::new(pairing.first, pairing.second, &self.config.engine)
            .with_metrics(self.metrics_collector.clone());
        let match_id = engine.match_id();
        let difficulty = engine.difficulty();

        self.metrics_collector
            .record_match_started(difficulty, opponent_kind);
        if synthesized {
            self.metrics_collector.record_opponent_synthesized(difficulty);
        }

        let event = MatchStarted {
            match_id,
            difficulty,
            seats: engine.seats(),
            timestamp: current_timestamp(),
        };

        let matchmaker = self.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = matchmaker.event_publisher.publish_match_started(event).await {
                warn!("Failed to publish start event for match {}: {}", match_id, e);
            }

            let started = Instant::now();
            let report = engine.run().await;
            matchmaker.metrics_collector.record_match_finished(
                report.outcome(),
                report.turns,
                started.elapsed(),
            );

            if let Err(e) = matchmaker.complete_match(&report).await {
                error!("Failed to complete match {}: {}", match_id, e);
            }
            report
        });

        LaunchedMatch { match_id, handle }
    }

    /// Requeue or release both sides of a finished match
    pub async fn complete_match(&self, report: &MatchReport) -> Result<()> {
        let won = report.state == MatchState::Won;
        self.update_stats(|stats| {
            if won {
                stats.matches_completed += 1;
            } else {
                stats.matches_abandoned += 1;
            }
            stats.active_matches = stats.active_matches.saturating_sub(1);
        })?;

        let event = MatchFinished {
            match_id: report.match_id,
            outcome: report.outcome(),
            winner: report.winner_name().map(str::to_string),
            turns: report.turns,
            timestamp: current_timestamp(),
        };
        if let Err(e) = self.event_publisher.publish_match_finished(event).await {
            warn!(
                "Failed to publish finish event for match {}: {}",
                report.match_id, e
            );
        }

        for seat in &report.seats {
            let answer = match seat.rematch {
                RematchAnswer::Accepted => "accepted",
                RematchAnswer::Declined => "declined",
                RematchAnswer::Unreachable => "unreachable",
            };
            self.metrics_collector.record_rematch_answer(answer);

            // Synthesized opponents were never registered
            let Some(id) = seat.participant_id() else {
                seat.player.set_in_match(false);
                continue;
            };

            if seat.rematch.continues() {
                seat.player.set_in_match(false);
                match self.registry.enqueue(id) {
                    Ok(()) => {
                        info!(
                            "Participant {} ('{}') requeued after match {}",
                            id,
                            seat.player.name(),
                            report.match_id
                        );
                        if let Err(e) = seat.player.notify(LobbyMessage::AwaitingOpponent).await
                        {
                            warn!("Failed to notify participant {}: {}", id, e);
                        }
                    }
                    Err(e) => debug!("Participant {} not requeued: {}", id, e),
                }
            } else {
                let reason = match seat.rematch {
                    RematchAnswer::Unreachable => LeaveReason::Unreachable,
                    _ => LeaveReason::Declined,
                };
                self.release(id, reason).await?;
            }
        }

        self.wake.notify_one();
        Ok(())
    }

    /// Remove a participant and announce its departure
    async fn release(
        &self,
        id: ParticipantId,
        reason: LeaveReason,
    ) -> Result<Option<Arc<dyn Player>>> {
        let Some(player) = self.registry.remove(id)? else {
            return Ok(None);
        };

        info!(
            "Participant {} ('{}') leaving the lobby - reason: {:?}",
            id,
            player.name(),
            reason
        );

        self.update_stats(|stats| stats.participants_removed += 1)?;
        self.metrics_collector.record_participant_removed(reason);

        if reason != LeaveReason::Unreachable {
            if let Err(e) = player.notify(LobbyMessage::Leaving).await {
                warn!("Failed to notify participant {}: {}", id, e);
            }
        }

        let event = ParticipantLeft {
            participant_id: id,
            reason,
            timestamp: current_timestamp(),
        };
        if let Err(e) = self.event_publisher.publish_participant_left(event).await {
            warn!("Failed to publish leave event for participant {}: {}", id, e);
        }

        Ok(Some(player))
    }

    /// Spawn the recurring pairing loop
    ///
    /// The loop runs a cycle on every tick and whenever intake wakes it, and
    /// stops once the shutdown flag turns true.
    pub fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.cycle_period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                "Matchmaker loop started - cycle period: {:?}",
                self.config.cycle_period
            );

            loop {
                if *shutdown.borrow() {
                    break;
                }

                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = self.wake.notified() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                }

                if let Err(e) = self.run_cycle() {
                    error!("Matchmaking cycle failed: {}", e);
                }
            }

            info!("Matchmaker loop stopped");
        })
    }

    /// Get current matchmaker statistics
    pub fn get_stats(&self) -> Result<MatchmakerStats> {
        let mut stats = self
            .stats
            .read()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            })?
            .clone();

        stats.participants_waiting = self.registry.waiting_count()?;
        stats.participants_live = self.registry.participant_count()?;
        Ok(stats)
    }

    fn update_stats(&self, f: impl FnOnce(&mut MatchmakerStats)) -> Result<()> {
        let mut stats = self
            .stats
            .write()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire stats lock".to_string(),
            })?;
        f(&mut stats);
        Ok(())
    }
}
