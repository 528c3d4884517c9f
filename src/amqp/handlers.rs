//! AMQP message handlers for processing intake requests
//!
//! The consumer deserializes and validates each message, hands it to a
//! `MessageHandler` and acknowledges it afterwards. Invalid messages are
//! acknowledged too so they do not loop back onto the queue.

use crate::amqp::messages::MessageUtils;
use crate::error::{MatchmakingError, Result};
use crate::lobby::matchmaker::Matchmaker;
use crate::metrics::MetricsCollector;
use crate::player::{HumanPlayer, PlayerProfile, RemoteClient};
use crate::types::{IntakeRequest, JoinRequest};
use amqprs::{
    channel::{BasicAckArguments, BasicCancelArguments, BasicConsumeArguments, Channel},
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Builds the transport for a participant from its client queue name
pub type ClientFactory = Arc<dyn Fn(&str) -> Arc<dyn RemoteClient> + Send + Sync>;

/// Trait defining the interface for handling intake messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle_intake_request(&self, request: IntakeRequest) -> Result<()>;

    /// Handle processing errors
    async fn handle_error(&self, error: MatchmakingError, message_data: &[u8]);
}

/// Handler that forwards intake requests to the matchmaker
pub struct LobbyIntakeHandler {
    matchmaker: Arc<Matchmaker>,
    clients: ClientFactory,
    max_move_attempts: u32,
    metrics_collector: Arc<MetricsCollector>,
}

impl LobbyIntakeHandler {
    pub fn new(
        matchmaker: Arc<Matchmaker>,
        clients: ClientFactory,
        max_move_attempts: u32,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            matchmaker,
            clients,
            max_move_attempts,
            metrics_collector,
        }
    }

    async fn join(&self, request: JoinRequest) -> Result<()> {
        let client = (self.clients)(&request.client_queue);
        let player = HumanPlayer::new(
            PlayerProfile {
                name: request.name,
                difficulty: request.difficulty,
                opponent: request.opponent,
            },
            client,
            self.max_move_attempts,
        );

        let id = self.matchmaker.register(Arc::new(player)).await?;
        info!(
            "Join request from client queue '{}' registered as participant {}",
            request.client_queue, id
        );
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for LobbyIntakeHandler {
    async fn handle_intake_request(&self, request: IntakeRequest) -> Result<()> {
        let timer = self.metrics_collector.start_timer();

        let (kind, result) = match request {
            IntakeRequest::Join(join) => ("join", self.join(join).await),
            IntakeRequest::Leave(leave) => (
                "leave",
                self.matchmaker
                    .request_leave(leave.participant_id)
                    .await
                    .map(|_| ()),
            ),
            IntakeRequest::Requeue(requeue) => (
                "requeue",
                self.matchmaker.requeue(requeue.participant_id).await,
            ),
        };

        self.metrics_collector
            .record_intake_request(kind, timer.stop());
        result
    }

    async fn handle_error(&self, error: MatchmakingError, message_data: &[u8]) {
        warn!(
            "Discarding intake message ({} bytes): {}",
            message_data.len(),
            error
        );
    }
}

/// Consumer for the intake queue
pub struct IntakeConsumer {
    handler: Arc<dyn MessageHandler>,
    channel: Channel,
    consumer_tag: String,
}

impl IntakeConsumer {
    pub fn new(handler: Arc<dyn MessageHandler>, channel: Channel) -> Self {
        let consumer_tag = format!("intake-consumer-{}", uuid::Uuid::new_v4());

        Self {
            handler,
            channel,
            consumer_tag,
        }
    }

    /// Start consuming messages from the queue
    pub async fn start_consuming(&self, queue_name: &str) -> Result<()> {
        let args = BasicConsumeArguments::new(queue_name, &self.consumer_tag);

        self.channel
            .basic_consume(IntakeDelivery::new(self.handler.clone()), args)
            .await
            .map_err(|e| MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to start consuming: {}", e),
            })?;

        info!("Started consuming intake requests from queue: {}", queue_name);
        Ok(())
    }

    /// Stop consuming messages
    pub async fn stop_consuming(&self) -> Result<()> {
        let args = BasicCancelArguments::new(&self.consumer_tag);

        self.channel.basic_cancel(args).await.map_err(|e| {
            MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to stop consuming: {}", e),
            }
        })?;

        info!("Stopped consuming intake requests");
        Ok(())
    }
}

struct IntakeDelivery {
    handler: Arc<dyn MessageHandler>,
}

impl IntakeDelivery {
    fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self { handler }
    }

    async fn process_message(&self, content: &[u8]) -> Result<()> {
        let request = MessageUtils::deserialize_intake_request(content)?;
        self.handler.handle_intake_request(request).await
    }
}

#[async_trait]
impl AsyncConsumer for IntakeDelivery {
    async fn consume(
        &mut self,
        channel: &Channel,
        deliver: Deliver,
        _basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let delivery_tag = deliver.delivery_tag();
        let start_time = std::time::Instant::now();

        match self.process_message(&content).await {
            Ok(_) => {
                info!(
                    "Intake message processed - delivery_tag: {}, size: {} bytes, processing_time: {:.2}ms",
                    delivery_tag,
                    content.len(),
                    start_time.elapsed().as_secs_f64() * 1000.0
                );
            }
            Err(e) => {
                error!(
                    "Intake message failed - delivery_tag: {}, processing_time: {:.2}ms, error: {}",
                    delivery_tag,
                    start_time.elapsed().as_secs_f64() * 1000.0,
                    e
                );
                let error = match e.downcast::<MatchmakingError>() {
                    Ok(error) => error,
                    Err(other) => MatchmakingError::InternalError {
                        message: other.to_string(),
                    },
                };
                self.handler.handle_error(error, &content).await;
            }
        }

        let args = BasicAckArguments::new(delivery_tag, false);
        if let Err(e) = channel.basic_ack(args).await {
            warn!("Failed to ack intake message {}: {}", delivery_tag, e);
        }
    }
}
