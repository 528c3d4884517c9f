//! Test fixtures shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use nim_lobby::amqp::publisher::MockEventPublisher;
use nim_lobby::error::TransportError;
use nim_lobby::lobby::{Matchmaker, MatchmakerConfig};
use nim_lobby::metrics::MetricsCollector;
use nim_lobby::player::{HumanPlayer, Player, PlayerProfile, RemoteClient};
use nim_lobby::types::{Difficulty, LobbyEvent, LobbyMessage, OpponentKind};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Remote client that answers from a script
///
/// Scripted answers are consumed first. Once the move script runs out the
/// client keeps taking `fallback_take`, or times out when there is none.
/// Rematch questions are declined once their script runs out.
pub struct ScriptedClient {
    moves: Mutex<VecDeque<Result<u32, TransportError>>>,
    fallback_take: Option<u32>,
    rematches: Mutex<VecDeque<Result<bool, TransportError>>>,
    delivered: Mutex<Vec<LobbyMessage>>,
    move_requests: AtomicU32,
}

impl ScriptedClient {
    /// Always takes `take` marbles
    pub fn taking(take: u32) -> Self {
        Self {
            moves: Mutex::new(VecDeque::new()),
            fallback_take: Some(take),
            rematches: Mutex::new(VecDeque::new()),
            delivered: Mutex::new(Vec::new()),
            move_requests: AtomicU32::new(0),
        }
    }

    /// Never answers a move request in time
    pub fn unreachable() -> Self {
        Self {
            fallback_take: None,
            ..Self::taking(1)
        }
    }

    pub fn with_moves(self, moves: Vec<Result<u32, TransportError>>) -> Self {
        *self.moves.lock().unwrap() = moves.into();
        self
    }

    pub fn with_rematches(self, answers: Vec<Result<bool, TransportError>>) -> Self {
        *self.rematches.lock().unwrap() = answers.into();
        self
    }

    pub fn delivered(&self) -> Vec<LobbyMessage> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn move_requests(&self) -> u32 {
        self.move_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteClient for ScriptedClient {
    async fn request_move(&self, _pool: u32) -> Result<u32, TransportError> {
        self.move_requests.fetch_add(1, Ordering::SeqCst);
        if let Some(answer) = self.moves.lock().unwrap().pop_front() {
            return answer;
        }
        self.fallback_take
            .ok_or(TransportError::Timeout { timeout_ms: 10 })
    }

    async fn deliver(&self, message: LobbyMessage) -> Result<(), TransportError> {
        self.delivered.lock().unwrap().push(message);
        Ok(())
    }

    async fn ask_rematch(&self) -> Result<bool, TransportError> {
        self.rematches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(false))
    }
}

pub fn human(
    name: &str,
    difficulty: Difficulty,
    opponent: OpponentKind,
    client: Arc<ScriptedClient>,
) -> Arc<dyn Player> {
    Arc::new(HumanPlayer::new(
        PlayerProfile {
            name: name.to_string(),
            difficulty,
            opponent,
        },
        client,
        3,
    ))
}

pub struct TestLobby {
    pub matchmaker: Arc<Matchmaker>,
    pub publisher: Arc<MockEventPublisher>,
    pub metrics: Arc<MetricsCollector>,
}

impl TestLobby {
    pub fn new() -> Self {
        let publisher = Arc::new(MockEventPublisher::new());
        let metrics = Arc::new(MetricsCollector::new().expect("metrics collector"));
        let config = MatchmakerConfig {
            cycle_period: Duration::from_millis(20),
            ..MatchmakerConfig::default()
        };
        let matchmaker = Arc::new(Matchmaker::new(
            publisher.clone(),
            metrics.clone(),
            config,
        ));

        Self {
            matchmaker,
            publisher,
            metrics,
        }
    }

    /// Routing keys of everything published so far
    pub fn routing_keys(&self) -> Vec<String> {
        self.publisher.get_published_events()
    }

    pub fn count_events(&self, routing_key: &str) -> usize {
        self.routing_keys()
            .iter()
            .filter(|key| key.as_str() == routing_key)
            .count()
    }

    pub fn events(&self) -> Vec<LobbyEvent> {
        self.publisher.events()
    }
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
