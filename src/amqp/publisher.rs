//! AMQP event publisher for outbound lobby events

use crate::amqp::messages::{
    MessageEnvelope, LOBBY_EVENTS_EXCHANGE, MATCH_FINISHED_ROUTING_KEY, MATCH_STARTED_ROUTING_KEY,
    PARTICIPANT_JOINED_ROUTING_KEY, PARTICIPANT_LEFT_ROUTING_KEY,
};
use crate::error::{MatchmakingError, Result};
use crate::types::*;
use amqprs::{
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    BasicProperties,
};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Trait for publishing lobby events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish_participant_joined(&self, event: ParticipantJoined) -> Result<()>;

    async fn publish_participant_left(&self, event: ParticipantLeft) -> Result<()>;

    async fn publish_match_started(&self, event: MatchStarted) -> Result<()>;

    async fn publish_match_finished(&self, event: MatchFinished) -> Result<()>;
}

/// Configuration for event publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub exchange_name: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub enable_deduplication: bool,
    /// Correlation ids remembered for deduplication
    pub deduplication_capacity: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            exchange_name: LOBBY_EVENTS_EXCHANGE.to_string(),
            max_retries: 3,
            retry_delay_ms: 500,
            enable_deduplication: true,
            deduplication_capacity: 10_000,
        }
    }
}

/// Bounded set of recently published correlation ids
#[derive(Debug, Default)]
struct DedupCache {
    seen: HashSet<String>,
    order: VecDeque<String>,
}

impl DedupCache {
    fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    fn insert(&mut self, id: String, capacity: usize) {
        if !self.seen.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        while self.order.len() > capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// AMQP-based event publisher implementation
pub struct AmqpEventPublisher {
    channel: Channel,
    config: PublisherConfig,
    published_messages: Mutex<DedupCache>,
}

impl AmqpEventPublisher {
    /// Create a new event publisher and declare the events exchange
    pub async fn new(channel: Channel, config: PublisherConfig) -> Result<Self> {
        let publisher = Self {
            channel,
            config,
            published_messages: Mutex::new(DedupCache::default()),
        };

        publisher.setup_exchange().await?;

        Ok(publisher)
    }

    async fn setup_exchange(&self) -> Result<()> {
        let args = ExchangeDeclareArguments::new(&self.config.exchange_name, "topic");
        self.channel.exchange_declare(args).await.map_err(|e| {
            MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to declare lobby events exchange: {}", e),
            }
        })?;

        info!("Declared AMQP exchange '{}'", self.config.exchange_name);
        Ok(())
    }

    fn already_published(&self, correlation_id: &str) -> Result<bool> {
        let cache = self
            .published_messages
            .lock()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire published messages lock".to_string(),
            })?;
        Ok(cache.contains(correlation_id))
    }

    fn remember(&self, correlation_id: &str) -> Result<()> {
        let mut cache = self
            .published_messages
            .lock()
            .map_err(|_| MatchmakingError::InternalError {
                message: "Failed to acquire published messages lock".to_string(),
            })?;
        cache.insert(
            correlation_id.to_string(),
            self.config.deduplication_capacity,
        );
        Ok(())
    }

    /// Publish to the events exchange with retry logic
    async fn publish_event<T>(&self, envelope: &MessageEnvelope<T>) -> Result<()>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        if self.config.enable_deduplication && self.already_published(&envelope.correlation_id)? {
            debug!(
                "Message {} already published, skipping",
                envelope.correlation_id
            );
            return Ok(());
        }

        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.try_publish(envelope).await {
                Ok(_) => {
                    if self.config.enable_deduplication {
                        self.remember(&envelope.correlation_id)?;
                    }

                    debug!(
                        "Published event {} with routing key '{}'",
                        envelope.correlation_id, envelope.routing_key
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish event {} after {} retries: {}",
                            envelope.correlation_id, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for event {}: {}. Retrying in {:?}",
                        retry_count, envelope.correlation_id, e, delay
                    );

                    sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(5));
                }
            }
        }
    }

    /// Single publish attempt
    async fn try_publish<T>(&self, envelope: &MessageEnvelope<T>) -> Result<()>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
    {
        let payload = envelope.to_bytes()?;

        let args = BasicPublishArguments::new(&self.config.exchange_name, &envelope.routing_key);
        let mut properties = BasicProperties::default();
        properties
            .with_message_id(&envelope.correlation_id)
            .with_timestamp(envelope.timestamp.timestamp() as u64)
            .with_content_type("application/json");

        self.channel
            .basic_publish(properties, payload, args)
            .await
            .map_err(|e| MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to publish event: {}", e),
            })?;

        Ok(())
    }
}

#[async_trait]
impl EventPublisher for AmqpEventPublisher {
    async fn publish_participant_joined(&self, event: ParticipantJoined) -> Result<()> {
        let envelope = MessageEnvelope::new(event, PARTICIPANT_JOINED_ROUTING_KEY.to_string());
        self.publish_event(&envelope).await
    }

    async fn publish_participant_left(&self, event: ParticipantLeft) -> Result<()> {
        let envelope = MessageEnvelope::new(event, PARTICIPANT_LEFT_ROUTING_KEY.to_string());
        self.publish_event(&envelope).await
    }

    async fn publish_match_started(&self, event: MatchStarted) -> Result<()> {
        let envelope = MessageEnvelope::new(event, MATCH_STARTED_ROUTING_KEY.to_string());
        self.publish_event(&envelope).await
    }

    async fn publish_match_finished(&self, event: MatchFinished) -> Result<()> {
        let envelope = MessageEnvelope::new(event, MATCH_FINISHED_ROUTING_KEY.to_string());
        self.publish_event(&envelope).await
    }
}

/// Event publisher that only logs, used when the service runs without a broker
#[derive(Debug, Default)]
pub struct LoggingEventPublisher;

impl LoggingEventPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish_participant_joined(&self, event: ParticipantJoined) -> Result<()> {
        debug!("{}: {:?}", PARTICIPANT_JOINED_ROUTING_KEY, event);
        Ok(())
    }

    async fn publish_participant_left(&self, event: ParticipantLeft) -> Result<()> {
        debug!("{}: {:?}", PARTICIPANT_LEFT_ROUTING_KEY, event);
        Ok(())
    }

    async fn publish_match_started(&self, event: MatchStarted) -> Result<()> {
        debug!("{}: {:?}", MATCH_STARTED_ROUTING_KEY, event);
        Ok(())
    }

    async fn publish_match_finished(&self, event: MatchFinished) -> Result<()> {
        debug!("{}: {:?}", MATCH_FINISHED_ROUTING_KEY, event);
        Ok(())
    }
}

/// Event publisher that records events in memory for tests
#[derive(Debug, Default)]
pub struct MockEventPublisher {
    published_events: Mutex<Vec<LobbyEvent>>,
}

impl MockEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event: LobbyEvent) {
        if let Ok(mut events) = self.published_events.lock() {
            events.push(event);
        }
    }

    /// All recorded events in publication order
    pub fn events(&self) -> Vec<LobbyEvent> {
        self.published_events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Routing keys of the recorded events
    pub fn get_published_events(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|event| crate::amqp::messages::MessageUtils::get_routing_key(event).to_string())
            .collect()
    }

    pub fn clear_events(&self) {
        if let Ok(mut events) = self.published_events.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl EventPublisher for MockEventPublisher {
    async fn publish_participant_joined(&self, event: ParticipantJoined) -> Result<()> {
        self.record(LobbyEvent::ParticipantJoined(event));
        Ok(())
    }

    async fn publish_participant_left(&self, event: ParticipantLeft) -> Result<()> {
        self.record(LobbyEvent::ParticipantLeft(event));
        Ok(())
    }

    async fn publish_match_started(&self, event: MatchStarted) -> Result<()> {
        self.record(LobbyEvent::MatchStarted(event));
        Ok(())
    }

    async fn publish_match_finished(&self, event: MatchFinished) -> Result<()> {
        self.record(LobbyEvent::MatchFinished(event));
        Ok(())
    }
}
