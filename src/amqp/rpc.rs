//! Request/reply calls to participant clients over AMQP
//!
//! Every call is published to the participant's own queue through the default
//! exchange with `reply_to` pointing at the lobby's exclusive reply queue.
//! Replies are routed back to the waiting caller by correlation id.

use crate::amqp::messages::{ClientCall, ClientReply, MessageUtils, REPLY_QUEUE_PREFIX};
use crate::error::{MatchmakingError, Result, TransportError};
use crate::metrics::MetricsCollector;
use crate::player::RemoteClient;
use crate::types::LobbyMessage;
use amqprs::{
    channel::{
        BasicAckArguments, BasicConsumeArguments, BasicPublishArguments, Channel,
        QueueDeclareArguments,
    },
    consumer::AsyncConsumer,
    BasicProperties, Deliver,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, info, warn};

type PendingReplies = Arc<Mutex<HashMap<String, oneshot::Sender<ClientReply>>>>;

/// Shared request/reply machinery for all remote participants
pub struct RpcDispatcher {
    channel: Channel,
    reply_queue: String,
    pending: PendingReplies,
    reply_timeout: Option<Duration>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RpcDispatcher {
    /// Declare the reply queue and start consuming replies
    pub async fn new(
        channel: Channel,
        reply_timeout: Option<Duration>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Result<Arc<Self>> {
        let reply_queue = format!("{}.{}", REPLY_QUEUE_PREFIX, uuid::Uuid::new_v4());

        let args = QueueDeclareArguments::new(&reply_queue)
            .exclusive(true)
            .auto_delete(true)
            .finish();
        channel
            .queue_declare(args)
            .await
            .map_err(|e| MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to declare reply queue: {}", e),
            })?;

        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let consumer_tag = format!("reply-consumer-{}", uuid::Uuid::new_v4());
        let args = BasicConsumeArguments::new(&reply_queue, &consumer_tag);
        channel
            .basic_consume(ReplyConsumer::new(pending.clone()), args)
            .await
            .map_err(|e| MatchmakingError::AmqpConnectionFailed {
                message: format!("Failed to consume reply queue: {}", e),
            })?;

        match reply_timeout {
            Some(limit) => info!(
                "Listening for client replies on '{}' (timeout {:?})",
                reply_queue, limit
            ),
            None => info!("Listening for client replies on '{}'", reply_queue),
        }

        Ok(Arc::new(Self {
            channel,
            reply_queue,
            pending,
            reply_timeout,
            metrics,
        }))
    }

    pub fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    /// Number of calls still waiting for a reply
    pub fn pending_calls(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }

    /// Send `call` to `client_queue` and wait for the reply if one is expected
    pub async fn call(
        &self,
        client_queue: &str,
        call: ClientCall,
    ) -> std::result::Result<Option<ClientReply>, TransportError> {
        let start_time = Instant::now();
        let result = self.dispatch(client_queue, &call).await;

        if let Some(metrics) = &self.metrics {
            metrics.record_amqp_operation(call.operation(), result.is_ok(), start_time.elapsed());
        }
        result
    }

    async fn dispatch(
        &self,
        client_queue: &str,
        call: &ClientCall,
    ) -> std::result::Result<Option<ClientReply>, TransportError> {
        let payload =
            MessageUtils::serialize_message(call).map_err(|e| TransportError::Unreachable {
                details: e.to_string(),
            })?;
        let correlation_id = crate::utils::generate_correlation_id();

        let receiver = if call.expects_reply() {
            let (sender, receiver) = oneshot::channel();
            self.pending
                .lock()
                .map_err(|_| TransportError::Closed)?
                .insert(correlation_id.clone(), sender);
            Some(receiver)
        } else {
            None
        };

        let mut properties = BasicProperties::default();
        properties
            .with_correlation_id(&correlation_id)
            .with_reply_to(&self.reply_queue)
            .with_content_type("application/json");

        let args = BasicPublishArguments::new("", client_queue);
        if let Err(e) = self.channel.basic_publish(properties, payload, args).await {
            self.forget(&correlation_id);
            return Err(TransportError::Unreachable {
                details: format!("Failed to publish to '{}': {}", client_queue, e),
            });
        }

        let Some(receiver) = receiver else {
            return Ok(None);
        };

        let result = await_reply(receiver, self.reply_timeout).await;
        if let Err(TransportError::Timeout { timeout_ms }) = &result {
            self.forget(&correlation_id);
            debug!(
                "Call {} to '{}' timed out after {}ms",
                correlation_id, client_queue, timeout_ms
            );
        }
        result.map(Some)
    }

    fn forget(&self, correlation_id: &str) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(correlation_id);
        }
    }
}

/// Wait for a routed reply, bounded only when `reply_timeout` is set
async fn await_reply(
    receiver: oneshot::Receiver<ClientReply>,
    reply_timeout: Option<Duration>,
) -> std::result::Result<ClientReply, TransportError> {
    let Some(limit) = reply_timeout else {
        return receiver.await.map_err(|_| TransportError::Closed);
    };

    match timeout(limit, receiver).await {
        Ok(Ok(reply)) => Ok(reply),
        Ok(Err(_)) => Err(TransportError::Closed),
        Err(_) => Err(TransportError::Timeout {
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}

/// Routes replies to waiting callers
struct ReplyConsumer {
    pending: PendingReplies,
}

impl ReplyConsumer {
    fn new(pending: PendingReplies) -> Self {
        Self { pending }
    }

    fn route(&self, correlation_id: Option<&String>, content: &[u8]) {
        let Some(correlation_id) = correlation_id else {
            warn!("Dropping client reply without correlation id");
            return;
        };

        let sender = match self.pending.lock() {
            Ok(mut pending) => pending.remove(correlation_id),
            Err(_) => {
                warn!("Failed to acquire pending replies lock");
                return;
            }
        };

        let Some(sender) = sender else {
            debug!("Dropping late or unknown reply {}", correlation_id);
            return;
        };

        match MessageUtils::deserialize_client_reply(content) {
            Ok(reply) => {
                // The caller may have given up already
                let _ = sender.send(reply);
            }
            Err(details) => {
                // Dropping the sender fails the waiting call as closed
                warn!("Malformed reply {}: {}", correlation_id, details);
            }
        }
    }
}

#[async_trait]
impl AsyncConsumer for ReplyConsumer {
    async fn consume(
        &mut self,
        channel: &Channel,
        deliver: Deliver,
        basic_properties: BasicProperties,
        content: Vec<u8>,
    ) {
        self.route(basic_properties.correlation_id(), &content);

        let args = BasicAckArguments::new(deliver.delivery_tag(), false);
        if let Err(e) = channel.basic_ack(args).await {
            warn!("Failed to ack client reply: {}", e);
        }
    }
}

/// `RemoteClient` for one participant, addressed by its client queue
pub struct AmqpRemoteClient {
    dispatcher: Arc<RpcDispatcher>,
    client_queue: String,
}

impl AmqpRemoteClient {
    pub fn new(dispatcher: Arc<RpcDispatcher>, client_queue: impl Into<String>) -> Self {
        Self {
            dispatcher,
            client_queue: client_queue.into(),
        }
    }

    pub fn client_queue(&self) -> &str {
        &self.client_queue
    }

    async fn expect_reply(
        &self,
        call: ClientCall,
    ) -> std::result::Result<ClientReply, TransportError> {
        self.dispatcher
            .call(&self.client_queue, call)
            .await?
            .ok_or_else(|| TransportError::MalformedReply {
                details: "No reply received".to_string(),
            })
    }
}

#[async_trait]
impl RemoteClient for AmqpRemoteClient {
    async fn request_move(&self, pool: u32) -> std::result::Result<u32, TransportError> {
        match self.expect_reply(ClientCall::RequestMove { pool }).await? {
            ClientReply::Move { take } => Ok(take),
            other => Err(TransportError::MalformedReply {
                details: format!("Expected a move, got {:?}", other),
            }),
        }
    }

    async fn deliver(&self, message: LobbyMessage) -> std::result::Result<(), TransportError> {
        self.dispatcher
            .call(&self.client_queue, ClientCall::Deliver { message })
            .await
            .map(|_| ())
    }

    async fn ask_rematch(&self) -> std::result::Result<bool, TransportError> {
        match self.expect_reply(ClientCall::AskRematch).await? {
            ClientReply::Rematch { accept } => Ok(accept),
            other => Err(TransportError::MalformedReply {
                details: format!("Expected a rematch answer, got {:?}", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_with(id: &str) -> (PendingReplies, oneshot::Receiver<ClientReply>) {
        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let (sender, receiver) = oneshot::channel();
        pending.lock().unwrap().insert(id.to_string(), sender);
        (pending, receiver)
    }

    #[tokio::test]
    async fn test_reply_is_routed_by_correlation_id() {
        let (pending, receiver) = pending_with("call-1");
        let consumer = ReplyConsumer::new(pending.clone());

        consumer.route(Some(&"call-1".to_string()), br#"{"reply":"move","take":2}"#);

        assert_eq!(receiver.await.unwrap(), ClientReply::Move { take: 2 });
        assert!(pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_reply_closes_the_call() {
        let (pending, receiver) = pending_with("call-2");
        let consumer = ReplyConsumer::new(pending.clone());

        consumer.route(Some(&"call-2".to_string()), b"garbage");

        assert!(receiver.await.is_err());
        assert!(pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_and_missing_ids_are_ignored() {
        let (pending, _receiver) = pending_with("call-3");
        let consumer = ReplyConsumer::new(pending.clone());

        consumer.route(Some(&"other".to_string()), br#"{"reply":"rematch","accept":true}"#);
        consumer.route(None, br#"{"reply":"rematch","accept":true}"#);

        assert_eq!(pending.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_slow_reply_is_awaited_without_a_timeout() {
        let (sender, receiver) = oneshot::channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = sender.send(ClientReply::Move { take: 3 });
        });

        let reply = await_reply(receiver, None).await.unwrap();
        assert_eq!(reply, ClientReply::Move { take: 3 });
    }

    #[tokio::test]
    async fn test_configured_timeout_bounds_the_wait() {
        let (_sender, receiver) = oneshot::channel();

        let result = await_reply(receiver, Some(Duration::from_millis(50))).await;
        assert!(matches!(result, Err(TransportError::Timeout { timeout_ms: 50 })));
    }
}
