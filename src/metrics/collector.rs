//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the nim-lobby service using
//! Prometheus metrics.

use crate::lobby::matchmaker::MatchmakerStats;
use crate::types::{Difficulty, LeaveReason, MatchOutcome, OpponentKind};
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the lobby service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Registry and queue metrics
    lobby_metrics: LobbyMetrics,

    /// Match metrics
    game_metrics: GameMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Total AMQP messages processed
    pub amqp_messages_total: IntCounterVec,

    /// AMQP message processing errors
    pub amqp_errors_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Registry and waiting queue metrics
#[derive(Clone)]
pub struct LobbyMetrics {
    /// Participants registered by tier and preferred opponent
    pub participants_registered_total: IntCounterVec,

    /// Participants removed by reason
    pub participants_removed_total: IntCounterVec,

    /// Participants currently in the waiting queue
    pub participants_waiting: IntGauge,

    /// Participants currently registered
    pub participants_live: IntGauge,

    /// Automated opponents synthesized by tier
    pub opponents_synthesized_total: IntCounterVec,
}

/// Match metrics
#[derive(Clone)]
pub struct GameMetrics {
    /// Matches launched by tier and opponent kind
    pub matches_started_total: IntCounterVec,

    /// Matches finished by outcome
    pub matches_finished_total: IntCounterVec,

    /// Matches currently running
    pub active_matches: IntGauge,

    /// Turns played per match
    pub match_turns: Histogram,

    /// Wall-clock duration of a match
    pub match_duration_seconds: Histogram,

    /// Failed calls to participants by operation
    pub transport_failures_total: IntCounterVec,

    /// Moves that broke the take contract
    pub contract_violations_total: IntCounter,

    /// Rematch answers by kind
    pub rematch_answers_total: IntCounterVec,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Duration of one matchmaking cycle
    pub cycle_duration: Histogram,

    /// Intake request processing time
    pub intake_processing_duration: HistogramVec,

    /// AMQP operation durations
    pub amqp_operation_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let lobby_metrics = LobbyMetrics::new(&registry)?;
        let game_metrics = GameMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            lobby_metrics,
            game_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn lobby(&self) -> &LobbyMetrics {
        &self.lobby_metrics
    }

    pub fn game(&self) -> &GameMetrics {
        &self.game_metrics
    }

    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Refresh gauges from matchmaker stats
    pub fn update_from_stats(&self, stats: &MatchmakerStats) {
        self.lobby_metrics
            .participants_waiting
            .set(stats.participants_waiting as i64);
        self.lobby_metrics
            .participants_live
            .set(stats.participants_live as i64);
        self.game_metrics
            .active_matches
            .set(stats.active_matches as i64);
    }

    /// Refresh queue gauges after an intake operation or cycle
    pub fn update_queue_gauges(&self, waiting: usize, live: usize) {
        self.lobby_metrics.participants_waiting.set(waiting as i64);
        self.lobby_metrics.participants_live.set(live as i64);
    }

    pub fn record_participant_registered(&self, difficulty: Difficulty, opponent: OpponentKind) {
        self.lobby_metrics
            .participants_registered_total
            .with_label_values(&[&difficulty.to_string(), &opponent.to_string()])
            .inc();
    }

    pub fn record_participant_removed(&self, reason: LeaveReason) {
        let reason_str = match reason {
            LeaveReason::Declined => "declined",
            LeaveReason::Requested => "requested",
            LeaveReason::Unreachable => "unreachable",
        };

        self.lobby_metrics
            .participants_removed_total
            .with_label_values(&[reason_str])
            .inc();
    }

    pub fn record_opponent_synthesized(&self, difficulty: Difficulty) {
        self.lobby_metrics
            .opponents_synthesized_total
            .with_label_values(&[&difficulty.to_string()])
            .inc();
    }

    /// Record a match being launched
    pub fn record_match_started(&self, difficulty: Difficulty, opponent: OpponentKind) {
        self.game_metrics
            .matches_started_total
            .with_label_values(&[&difficulty.to_string(), &opponent.to_string()])
            .inc();
        self.game_metrics.active_matches.inc();
    }

    /// Record a match reaching a terminal state
    pub fn record_match_finished(&self, outcome: MatchOutcome, turns: u32, duration: Duration) {
        self.game_metrics
            .matches_finished_total
            .with_label_values(&[&outcome.to_string()])
            .inc();
        self.game_metrics.active_matches.dec();
        self.game_metrics.match_turns.observe(f64::from(turns));
        self.game_metrics
            .match_duration_seconds
            .observe(duration.as_secs_f64());
    }

    pub fn record_transport_failure(&self, operation: &str) {
        self.game_metrics
            .transport_failures_total
            .with_label_values(&[operation])
            .inc();
    }

    pub fn record_contract_violation(&self) {
        self.game_metrics.contract_violations_total.inc();
    }

    pub fn record_rematch_answer(&self, answer: &str) {
        self.game_metrics
            .rematch_answers_total
            .with_label_values(&[answer])
            .inc();
    }

    /// Record one matchmaking cycle
    pub fn record_cycle(&self, duration: Duration) {
        self.performance_metrics
            .cycle_duration
            .observe(duration.as_secs_f64());
    }

    /// Record an intake request being processed
    pub fn record_intake_request(&self, request: &str, duration: Duration) {
        self.performance_metrics
            .intake_processing_duration
            .with_label_values(&[request])
            .observe(duration.as_secs_f64());
    }

    /// Record AMQP operation
    pub fn record_amqp_operation(&self, operation: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        self.service_metrics
            .amqp_messages_total
            .with_label_values(&[operation, status])
            .inc();

        if !success {
            self.service_metrics
                .amqp_errors_total
                .with_label_values(&[operation])
                .inc();
        }

        self.performance_metrics
            .amqp_operation_duration
            .with_label_values(&[operation, status])
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("nim_lobby_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let amqp_messages_total = IntCounterVec::new(
            Opts::new(
                "nim_lobby_amqp_messages_total",
                "Total AMQP messages processed",
            ),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_messages_total.clone()))?;

        let amqp_errors_total = IntCounterVec::new(
            Opts::new("nim_lobby_amqp_errors_total", "Total AMQP errors"),
            &["operation"],
        )?;
        registry.register(Box::new(amqp_errors_total.clone()))?;

        let health_status = IntGauge::new(
            "nim_lobby_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("nim_lobby_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            amqp_messages_total,
            amqp_errors_total,
            health_status,
            component_health,
        })
    }
}

impl LobbyMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let participants_registered_total = IntCounterVec::new(
            Opts::new(
                "nim_lobby_participants_registered_total",
                "Total participants registered",
            ),
            &["difficulty", "opponent"],
        )?;
        registry.register(Box::new(participants_registered_total.clone()))?;

        let participants_removed_total = IntCounterVec::new(
            Opts::new(
                "nim_lobby_participants_removed_total",
                "Total participants removed",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(participants_removed_total.clone()))?;

        let participants_waiting = IntGauge::new(
            "nim_lobby_participants_waiting",
            "Participants currently waiting in queue",
        )?;
        registry.register(Box::new(participants_waiting.clone()))?;

        let participants_live = IntGauge::new(
            "nim_lobby_participants_live",
            "Participants currently registered",
        )?;
        registry.register(Box::new(participants_live.clone()))?;

        let opponents_synthesized_total = IntCounterVec::new(
            Opts::new(
                "nim_lobby_opponents_synthesized_total",
                "Automated opponents synthesized",
            ),
            &["difficulty"],
        )?;
        registry.register(Box::new(opponents_synthesized_total.clone()))?;

        Ok(Self {
            participants_registered_total,
            participants_removed_total,
            participants_waiting,
            participants_live,
            opponents_synthesized_total,
        })
    }
}

impl GameMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let matches_started_total = IntCounterVec::new(
            Opts::new("nim_lobby_matches_started_total", "Total matches started"),
            &["difficulty", "opponent"],
        )?;
        registry.register(Box::new(matches_started_total.clone()))?;

        let matches_finished_total = IntCounterVec::new(
            Opts::new("nim_lobby_matches_finished_total", "Total matches finished"),
            &["outcome"],
        )?;
        registry.register(Box::new(matches_finished_total.clone()))?;

        let active_matches =
            IntGauge::new("nim_lobby_active_matches", "Matches currently running")?;
        registry.register(Box::new(active_matches.clone()))?;

        let match_turns = Histogram::with_opts(
            HistogramOpts::new("nim_lobby_match_turns", "Turns played per match")
                .buckets(vec![1.0, 2.0, 4.0, 6.0, 8.0, 12.0, 16.0, 24.0, 32.0]),
        )?;
        registry.register(Box::new(match_turns.clone()))?;

        let match_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("nim_lobby_match_duration_seconds", "Match duration")
                .buckets(vec![0.01, 0.1, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]),
        )?;
        registry.register(Box::new(match_duration_seconds.clone()))?;

        let transport_failures_total = IntCounterVec::new(
            Opts::new(
                "nim_lobby_transport_failures_total",
                "Failed remote calls to participants",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(transport_failures_total.clone()))?;

        let contract_violations_total = IntCounter::new(
            "nim_lobby_contract_violations_total",
            "Moves that broke the take contract",
        )?;
        registry.register(Box::new(contract_violations_total.clone()))?;

        let rematch_answers_total = IntCounterVec::new(
            Opts::new("nim_lobby_rematch_answers_total", "Rematch answers"),
            &["answer"],
        )?;
        registry.register(Box::new(rematch_answers_total.clone()))?;

        Ok(Self {
            matches_started_total,
            matches_finished_total,
            active_matches,
            match_turns,
            match_duration_seconds,
            transport_failures_total,
            contract_violations_total,
            rematch_answers_total,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let cycle_duration = Histogram::with_opts(
            HistogramOpts::new(
                "nim_lobby_cycle_duration_seconds",
                "Matchmaking cycle duration",
            )
            .buckets(vec![0.0001, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        )?;
        registry.register(Box::new(cycle_duration.clone()))?;

        let intake_processing_duration = HistogramVec::new(
            HistogramOpts::new(
                "nim_lobby_intake_processing_duration_seconds",
                "Intake request processing time",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["request"],
        )?;
        registry.register(Box::new(intake_processing_duration.clone()))?;

        let amqp_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "nim_lobby_amqp_operation_duration_seconds",
                "AMQP operation duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_operation_duration.clone()))?;

        Ok(Self {
            cycle_duration,
            intake_processing_duration,
            amqp_operation_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        let _service = collector.service();
        let _lobby = collector.lobby();
        let _game = collector.game();
        let _performance = collector.performance();
    }

    #[test]
    fn test_match_lifecycle_recording() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.record_match_started(Difficulty::Hard, OpponentKind::Automated);
        collector.record_match_started(Difficulty::Easy, OpponentKind::Human);
        assert_eq!(collector.game().active_matches.get(), 2);

        collector.record_match_finished(MatchOutcome::Won, 7, Duration::from_millis(20));
        assert_eq!(collector.game().active_matches.get(), 1);
        assert_eq!(
            collector
                .game()
                .matches_finished_total
                .with_label_values(&["won"])
                .get(),
            1
        );
    }

    #[test]
    fn test_failure_counters() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.record_transport_failure("choose_move");
        collector.record_transport_failure("choose_move");
        collector.record_contract_violation();

        assert_eq!(
            collector
                .game()
                .transport_failures_total
                .with_label_values(&["choose_move"])
                .get(),
            2
        );
        assert_eq!(collector.game().contract_violations_total.get(), 1);
    }

    #[test]
    fn test_lobby_recording() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.record_participant_registered(Difficulty::Easy, OpponentKind::Human);
        collector.record_participant_removed(LeaveReason::Declined);
        collector.record_opponent_synthesized(Difficulty::Hard);
        collector.update_queue_gauges(3, 5);

        assert_eq!(collector.lobby().participants_waiting.get(), 3);
        assert_eq!(collector.lobby().participants_live.get(), 5);
    }

    #[test]
    fn test_health_status_updates() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.update_health_status(2);
        collector.update_component_health("matchmaker", true);
        collector.update_component_health("amqp", false);
        collector.record_amqp_operation("intake", false, Duration::from_millis(3));
        assert_eq!(collector.service().health_status.get(), 2);
    }

    #[test]
    fn test_metrics_timer() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");
        let timer = collector.start_timer();

        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.elapsed() >= Duration::from_millis(10));
        assert!(timer.stop() >= Duration::from_millis(10));
    }
}
