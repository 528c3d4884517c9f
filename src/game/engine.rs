//! Match engine that plays one game of misère Nim
//!
//! Players alternate taking between one and half of the pool. Whoever leaves
//! exactly one marble wins. Each engine runs on its own task and owns all of
//! its turn state; when it finishes, both sides are asked whether they want
//! another match and the answers go back to the matchmaker in a `MatchReport`.

use crate::error::PlayerError;
use crate::metrics::MetricsCollector;
use crate::player::Player;
use crate::types::{
    Difficulty, LobbyMessage, MatchId, MatchOutcome, MatchSeat, OpponentKind, ParticipantId,
};
use crate::utils::generate_match_id;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Tunables shared by every match the matchmaker launches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Starting pool range for easy matches
    pub easy_pool: RangeInclusive<u32>,
    /// Starting pool range for hard matches
    pub hard_pool: RangeInclusive<u32>,
    /// Failed move requests in a row before the match is abandoned
    pub max_consecutive_failures: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            easy_pool: 5..=23,
            hard_pool: 5..=103,
            max_consecutive_failures: 6,
        }
    }
}

impl EngineConfig {
    pub fn pool_range(&self, difficulty: Difficulty) -> RangeInclusive<u32> {
        match difficulty {
            Difficulty::Easy => self.easy_pool.clone(),
            Difficulty::Hard => self.hard_pool.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchState {
    NotStarted,
    InProgress,
    Won,
    /// Ended early by a broken move contract or an unreachable pair of players
    Abandoned,
}

/// A participant's answer to the rematch question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RematchAnswer {
    Accepted,
    Declined,
    /// The question could not be delivered
    Unreachable,
}

impl RematchAnswer {
    pub fn continues(self) -> bool {
        matches!(self, RematchAnswer::Accepted)
    }
}

/// One side of a finished match
pub struct SeatReport {
    pub player: Arc<dyn Player>,
    pub rematch: RematchAnswer,
}

impl SeatReport {
    pub fn participant_id(&self) -> Option<ParticipantId> {
        self.player.participant_id()
    }
}

impl std::fmt::Debug for SeatReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeatReport")
            .field("name", &self.player.name())
            .field("participant_id", &self.player.participant_id())
            .field("rematch", &self.rematch)
            .finish()
    }
}

/// Everything the matchmaker needs once a match is over
#[derive(Debug)]
pub struct MatchReport {
    pub match_id: MatchId,
    pub difficulty: Difficulty,
    pub state: MatchState,
    /// Seat index of the winner
    pub winner: Option<usize>,
    pub turns: u32,
    pub starting_pool: u32,
    pub final_pool: u32,
    pub seats: [SeatReport; 2],
}

impl MatchReport {
    pub fn winner_name(&self) -> Option<&str> {
        self.winner.map(|seat| self.seats[seat].player.name())
    }

    pub fn outcome(&self) -> MatchOutcome {
        match self.state {
            MatchState::Won => MatchOutcome::Won,
            _ => MatchOutcome::Abandoned,
        }
    }
}

pub struct MatchEngine {
    match_id: MatchId,
    players: [Arc<dyn Player>; 2],
    difficulty: Difficulty,
    starting_pool: u32,
    pool: u32,
    current: usize,
    state: MatchState,
    winner: Option<usize>,
    turns: u32,
    max_consecutive_failures: u32,
    metrics_collector: Option<Arc<MetricsCollector>>,
}

impl MatchEngine {
    /// Set up a match with a random first mover and a random starting pool
    pub fn new(first: Arc<dyn Player>, second: Arc<dyn Player>, config: &EngineConfig) -> Self {
        let difficulty = first.difficulty();
        let mut rng = rand::thread_rng();
        let pool = rng.gen_range(config.pool_range(difficulty));
        let first_mover = if rng.gen_bool(0.5) { 0 } else { 1 };

        Self::with_setup(first, second, pool, first_mover, config)
    }

    /// Set up a match with an explicit starting pool and first mover
    pub fn with_setup(
        first: Arc<dyn Player>,
        second: Arc<dyn Player>,
        pool: u32,
        first_mover: usize,
        config: &EngineConfig,
    ) -> Self {
        Self {
            match_id: generate_match_id(),
            difficulty: first.difficulty(),
            players: [first, second],
            starting_pool: pool,
            pool,
            current: first_mover % 2,
            state: MatchState::NotStarted,
            winner: None,
            turns: 0,
            max_consecutive_failures: config.max_consecutive_failures,
            metrics_collector: None,
        }
    }

    pub fn with_metrics(mut self, metrics_collector: Arc<MetricsCollector>) -> Self {
        self.metrics_collector = Some(metrics_collector);
        self
    }

    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    pub fn pool(&self) -> u32 {
        self.pool
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn seats(&self) -> Vec<MatchSeat> {
        self.players
            .iter()
            .map(|player| MatchSeat {
                participant_id: player.participant_id(),
                name: player.name().to_string(),
                is_human: player.is_human(),
            })
            .collect()
    }

    pub fn opponent_kind(&self) -> OpponentKind {
        if self.players.iter().all(|player| player.is_human()) {
            OpponentKind::Human
        } else {
            OpponentKind::Automated
        }
    }

    /// Play the match to a terminal state and collect rematch answers
    pub async fn run(mut self) -> MatchReport {
        let started = Instant::now();
        info!(
            "Match {} starting - '{}' vs '{}', difficulty: {}, pool: {}, first: '{}'",
            self.match_id,
            self.players[0].name(),
            self.players[1].name(),
            self.difficulty,
            self.pool,
            self.players[self.current].name()
        );

        self.announce().await;
        self.state = MatchState::InProgress;

        let mut consecutive_failures = 0;
        while self.state == MatchState::InProgress {
            let mover = self.players[self.current].clone();
            let opponent = self.players[1 - self.current].clone();

            match mover.choose_move(self.pool).await {
                Ok(take) if take == 0 || take >= self.pool => {
                    error!(
                        "Match {}: '{}' took {} from a pool of {}, abandoning",
                        self.match_id,
                        mover.name(),
                        take,
                        self.pool
                    );
                    self.record_contract_violation();
                    self.state = MatchState::Abandoned;
                }
                Ok(take) => {
                    consecutive_failures = 0;
                    self.pool -= take;
                    self.turns += 1;
                    debug!(
                        "Match {}: '{}' took {}, {} left",
                        self.match_id,
                        mover.name(),
                        take,
                        self.pool
                    );

                    if opponent.is_human() {
                        let message = LobbyMessage::MoveMade {
                            by: mover.name().to_string(),
                            taken: take,
                            remaining: self.pool,
                        };
                        if let Err(e) = opponent.notify(message).await {
                            self.transport_failure("notify", opponent.as_ref(), &e);
                        }
                    }

                    if self.pool == 1 {
                        self.finish_won(self.current).await;
                    }
                }
                Err(e) if e.is_transport() => {
                    self.transport_failure("choose_move", mover.as_ref(), &e);
                    consecutive_failures += 1;
                    if consecutive_failures >= self.max_consecutive_failures {
                        warn!(
                            "Match {}: {} move requests failed in a row, abandoning",
                            self.match_id, consecutive_failures
                        );
                        self.state = MatchState::Abandoned;
                    }
                }
                Err(e) => {
                    error!(
                        "Match {}: '{}' broke the move contract: {}",
                        self.match_id,
                        mover.name(),
                        e
                    );
                    self.record_contract_violation();
                    self.state = MatchState::Abandoned;
                }
            }

            self.current = 1 - self.current;
        }

        let rematch = self.collect_rematch_answers().await;

        info!(
            "Match {} finished - state: {:?}, winner: {}, turns: {}, duration: {:.2}s",
            self.match_id,
            self.state,
            self.winner
                .map(|seat| self.players[seat].name())
                .unwrap_or("none"),
            self.turns,
            started.elapsed().as_secs_f64()
        );

        let [first, second] = self.players;
        MatchReport {
            match_id: self.match_id,
            difficulty: self.difficulty,
            state: self.state,
            winner: self.winner,
            turns: self.turns,
            starting_pool: self.starting_pool,
            final_pool: self.pool,
            seats: [
                SeatReport {
                    player: first,
                    rematch: rematch[0],
                },
                SeatReport {
                    player: second,
                    rematch: rematch[1],
                },
            ],
        }
    }

    /// Tell each human who they are playing and how the match starts
    async fn announce(&self) {
        let first_mover = self.players[self.current].name().to_string();

        for seat in 0..2 {
            let player = &self.players[seat];
            if !player.is_human() {
                continue;
            }

            let messages = [
                LobbyMessage::OpponentFound {
                    opponent: self.players[1 - seat].name().to_string(),
                },
                LobbyMessage::MatchStarting {
                    pool: self.pool,
                    first_mover: first_mover.clone(),
                },
            ];
            for message in messages {
                if let Err(e) = player.notify(message).await {
                    self.transport_failure("notify", player.as_ref(), &e);
                }
            }
        }
    }

    async fn finish_won(&mut self, winner: usize) {
        self.winner = Some(winner);
        self.state = MatchState::Won;

        let winner_player = self.players[winner].clone();
        let loser_player = self.players[1 - winner].clone();
        info!(
            "Match {}: '{}' wins, '{}' is left with the last marble",
            self.match_id,
            winner_player.name(),
            loser_player.name()
        );

        if winner_player.is_human() {
            if let Err(e) = winner_player.notify_win().await {
                self.transport_failure("notify_win", winner_player.as_ref(), &e);
            }
        }
        if loser_player.is_human() {
            if let Err(e) = loser_player.notify_loss().await {
                self.transport_failure("notify_loss", loser_player.as_ref(), &e);
            }
        }
    }

    async fn collect_rematch_answers(&self) -> [RematchAnswer; 2] {
        let (first, second) = tokio::join!(
            self.players[0].wants_rematch(),
            self.players[1].wants_rematch()
        );

        [
            self.interpret_rematch(0, first),
            self.interpret_rematch(1, second),
        ]
    }

    fn interpret_rematch(
        &self,
        seat: usize,
        answer: Result<bool, PlayerError>,
    ) -> RematchAnswer {
        match answer {
            Ok(true) => RematchAnswer::Accepted,
            Ok(false) => RematchAnswer::Declined,
            Err(e) => {
                self.transport_failure("wants_rematch", self.players[seat].as_ref(), &e);
                RematchAnswer::Unreachable
            }
        }
    }

    fn transport_failure(&self, operation: &str, player: &dyn Player, error: &PlayerError) {
        warn!(
            "Match {}: {} failed for '{}': {}",
            self.match_id,
            operation,
            player.name(),
            error
        );
        if let Some(metrics) = &self.metrics_collector {
            metrics.record_transport_failure(operation);
        }
    }

    fn record_contract_violation(&self) {
        if let Some(metrics) = &self.metrics_collector {
            metrics.record_contract_violation();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::ComputerPlayer;
    use crate::error::{PlayerResult, TransportError};
    use crate::player::SeatState;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Player that replays scripted moves and records what it was told
    struct ScriptedPlayer {
        name: String,
        human: bool,
        moves: Mutex<VecDeque<PlayerResult<u32>>>,
        fallback: PlayerResult<u32>,
        rematch: PlayerResult<bool>,
        inbox: Mutex<Vec<LobbyMessage>>,
        seat: SeatState,
    }

    impl ScriptedPlayer {
        fn always(name: &str, take: u32) -> Self {
            Self {
                name: name.to_string(),
                human: true,
                moves: Mutex::new(VecDeque::new()),
                fallback: Ok(take),
                rematch: Ok(false),
                inbox: Mutex::new(Vec::new()),
                seat: SeatState::new(),
            }
        }

        fn with_moves(mut self, moves: Vec<PlayerResult<u32>>) -> Self {
            self.moves = Mutex::new(moves.into());
            self
        }

        fn with_fallback(mut self, fallback: PlayerResult<u32>) -> Self {
            self.fallback = fallback;
            self
        }

        fn with_rematch(mut self, rematch: PlayerResult<bool>) -> Self {
            self.rematch = rematch;
            self
        }

        fn inbox(&self) -> Vec<LobbyMessage> {
            self.inbox.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Player for ScriptedPlayer {
        fn name(&self) -> &str {
            &self.name
        }
        fn is_human(&self) -> bool {
            self.human
        }
        fn preferred_opponent(&self) -> OpponentKind {
            OpponentKind::Human
        }
        fn difficulty(&self) -> Difficulty {
            Difficulty::Easy
        }
        fn participant_id(&self) -> Option<ParticipantId> {
            self.seat.participant_id()
        }
        fn set_participant_id(&self, id: ParticipantId) {
            self.seat.set_participant_id(id)
        }
        fn in_match(&self) -> bool {
            self.seat.in_match()
        }
        fn set_in_match(&self, in_match: bool) {
            self.seat.set_in_match(in_match)
        }
        async fn choose_move(&self, _pool: u32) -> PlayerResult<u32> {
            let scripted = self.moves.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| self.fallback.clone())
        }
        async fn notify(&self, message: LobbyMessage) -> PlayerResult<()> {
            self.inbox.lock().unwrap().push(message);
            Ok(())
        }
        async fn wants_rematch(&self) -> PlayerResult<bool> {
            self.rematch.clone()
        }
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[tokio::test]
    async fn test_pool_of_five_taking_one_each_turn() {
        let a = Arc::new(ScriptedPlayer::always("a", 1));
        let b = Arc::new(ScriptedPlayer::always("b", 1));

        let report = MatchEngine::with_setup(a.clone(), b.clone(), 5, 0, &config())
            .run()
            .await;

        assert_eq!(report.state, MatchState::Won);
        assert_eq!(report.turns, 4);
        assert_eq!(report.final_pool, 1);
        // a moves on turns 1 and 3, b on turns 2 and 4
        assert_eq!(report.winner, Some(1));
        assert_eq!(report.winner_name(), Some("b"));
        assert_eq!(report.outcome(), MatchOutcome::Won);

        assert!(b.inbox().contains(&LobbyMessage::Won));
        assert!(a.inbox().contains(&LobbyMessage::Lost));
        assert!(a.inbox().contains(&LobbyMessage::MoveMade {
            by: "b".to_string(),
            taken: 1,
            remaining: 1,
        }));
    }

    #[tokio::test]
    async fn test_announces_opponent_and_start() {
        let a = Arc::new(ScriptedPlayer::always("a", 1));
        let b = Arc::new(ScriptedPlayer::always("b", 1));

        MatchEngine::with_setup(a.clone(), b.clone(), 3, 1, &config())
            .run()
            .await;

        let inbox = a.inbox();
        assert_eq!(
            inbox[0],
            LobbyMessage::OpponentFound {
                opponent: "b".to_string()
            }
        );
        assert_eq!(
            inbox[1],
            LobbyMessage::MatchStarting {
                pool: 3,
                first_mover: "b".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_match_against_computer_always_terminates() {
        let human = Arc::new(ScriptedPlayer::always("human", 1).with_rematch(Ok(true)));
        let bot = Arc::new(ComputerPlayer::new(Difficulty::Hard));

        let report = MatchEngine::new(human.clone(), bot, &config()).run().await;

        assert_eq!(report.state, MatchState::Won);
        assert_eq!(report.final_pool, 1);
        assert!(report.starting_pool >= 5 && report.starting_pool <= 23);
        assert_eq!(report.seats[0].rematch, RematchAnswer::Accepted);
        assert_eq!(report.seats[1].rematch, RematchAnswer::Declined);
    }

    #[tokio::test]
    async fn test_transport_failure_passes_the_turn() {
        let a = Arc::new(
            ScriptedPlayer::always("a", 1)
                .with_moves(vec![Err(TransportError::Timeout { timeout_ms: 10 }.into())]),
        );
        let b = Arc::new(ScriptedPlayer::always("b", 1));

        let report = MatchEngine::with_setup(a, b, 4, 0, &config()).run().await;

        // a fails, b: 4->3, a: 3->2, b: 2->1
        assert_eq!(report.state, MatchState::Won);
        assert_eq!(report.turns, 3);
        assert_eq!(report.winner_name(), Some("b"));
    }

    #[tokio::test]
    async fn test_unreachable_players_abandon_the_match() {
        let gone = || {
            ScriptedPlayer::always("gone", 1).with_fallback(Err(TransportError::Closed.into()))
        };
        let a = Arc::new(gone().with_rematch(Err(TransportError::Closed.into())));
        let b = Arc::new(gone());

        let engine_config = EngineConfig {
            max_consecutive_failures: 4,
            ..EngineConfig::default()
        };
        let report = MatchEngine::with_setup(a, b, 10, 0, &engine_config)
            .run()
            .await;

        assert_eq!(report.state, MatchState::Abandoned);
        assert_eq!(report.turns, 0);
        assert_eq!(report.final_pool, 10);
        assert_eq!(report.outcome(), MatchOutcome::Abandoned);
        assert_eq!(report.seats[0].rematch, RematchAnswer::Unreachable);
        assert_eq!(report.seats[1].rematch, RematchAnswer::Declined);
    }

    #[tokio::test]
    async fn test_move_emptying_the_pool_abandons() {
        let a = Arc::new(ScriptedPlayer::always("a", 6));
        let b = Arc::new(ScriptedPlayer::always("b", 1));

        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let report = MatchEngine::with_setup(a, b, 6, 0, &config())
            .with_metrics(metrics.clone())
            .run()
            .await;

        assert_eq!(report.state, MatchState::Abandoned);
        assert_eq!(report.final_pool, 6);
        assert_eq!(report.winner, None);
        assert_eq!(metrics.game().contract_violations_total.get(), 1);
    }

    #[tokio::test]
    async fn test_illegal_move_error_abandons() {
        let a = Arc::new(
            ScriptedPlayer::always("a", 1)
                .with_fallback(Err(PlayerError::IllegalMove { take: 9, pool: 10 })),
        );
        let b = Arc::new(ScriptedPlayer::always("b", 1));

        let report = MatchEngine::with_setup(a, b, 10, 0, &config()).run().await;

        assert_eq!(report.state, MatchState::Abandoned);
        assert_eq!(report.turns, 0);
    }

    #[test]
    fn test_pool_ranges() {
        let config = EngineConfig::default();
        assert_eq!(config.pool_range(Difficulty::Easy), 5..=23);
        assert_eq!(config.pool_range(Difficulty::Hard), 5..=103);

        for _ in 0..100 {
            let engine = MatchEngine::new(
                Arc::new(ComputerPlayer::new(Difficulty::Hard)),
                Arc::new(ComputerPlayer::new(Difficulty::Hard)),
                &config,
            );
            assert!((5..=103).contains(&engine.pool()));
            assert_eq!(engine.state(), MatchState::NotStarted);
        }
    }
}
