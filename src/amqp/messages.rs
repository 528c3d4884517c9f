//! AMQP message definitions and serialization

use crate::error::{MatchmakingError, Result};
use crate::types::*;
use serde::{Deserialize, Serialize};
use serde_json;

/// AMQP queue and exchange names
pub const INTAKE_QUEUE: &str = "nim_lobby.requests";
pub const LOBBY_EVENTS_EXCHANGE: &str = "nim_lobby.events";
pub const REPLY_QUEUE_PREFIX: &str = "nim_lobby.replies";

/// Routing keys for events
pub const PARTICIPANT_JOINED_ROUTING_KEY: &str = "participant.joined";
pub const PARTICIPANT_LEFT_ROUTING_KEY: &str = "participant.left";
pub const MATCH_STARTED_ROUTING_KEY: &str = "match.started";
pub const MATCH_FINISHED_ROUTING_KEY: &str = "match.finished";

/// Longest display name accepted at intake
pub const MAX_NAME_LENGTH: usize = 64;

/// Message envelope with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub payload: T,
    pub correlation_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub routing_key: String,
}

impl<T> MessageEnvelope<T>
where
    T: Serialize + serde::de::DeserializeOwned,
{
    pub fn new(payload: T, routing_key: String) -> Self {
        Self {
            payload,
            correlation_id: crate::utils::generate_correlation_id(),
            timestamp: crate::utils::current_timestamp(),
            routing_key,
        }
    }

    /// Serialize the envelope to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            MatchmakingError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }
}

/// Call sent from the lobby to a participant's client queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum ClientCall {
    RequestMove { pool: u32 },
    Deliver { message: LobbyMessage },
    AskRematch,
}

impl ClientCall {
    /// Whether the client is expected to answer on the reply queue
    pub fn expects_reply(&self) -> bool {
        !matches!(self, ClientCall::Deliver { .. })
    }

    pub fn operation(&self) -> &'static str {
        match self {
            ClientCall::RequestMove { .. } => "request_move",
            ClientCall::Deliver { .. } => "deliver",
            ClientCall::AskRematch => "ask_rematch",
        }
    }
}

/// Answer sent by a client to the lobby's reply queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum ClientReply {
    Move { take: u32 },
    Rematch { accept: bool },
}

/// Message serialization and validation utilities
pub struct MessageUtils;

impl MessageUtils {
    /// Deserialize intake request from bytes
    pub fn deserialize_intake_request(bytes: &[u8]) -> Result<IntakeRequest> {
        let request: IntakeRequest =
            serde_json::from_slice(bytes).map_err(|e| MatchmakingError::InvalidRequest {
                reason: format!("Failed to deserialize intake request: {}", e),
            })?;

        Self::validate_intake_request(&request)?;
        Ok(request)
    }

    /// Validate an intake request
    pub fn validate_intake_request(request: &IntakeRequest) -> Result<()> {
        match request {
            IntakeRequest::Join(join) => {
                if join.name.trim().is_empty() {
                    return Err(MatchmakingError::InvalidRequest {
                        reason: "Name cannot be empty".to_string(),
                    }
                    .into());
                }

                if join.name.chars().count() > MAX_NAME_LENGTH {
                    return Err(MatchmakingError::InvalidRequest {
                        reason: format!("Name cannot exceed {} characters", MAX_NAME_LENGTH),
                    }
                    .into());
                }

                if join.client_queue.is_empty() {
                    return Err(MatchmakingError::InvalidRequest {
                        reason: "Client queue cannot be empty".to_string(),
                    }
                    .into());
                }
            }
            IntakeRequest::Leave(LeaveRequest { participant_id, .. })
            | IntakeRequest::Requeue(RequeueRequest { participant_id, .. }) => {
                if *participant_id == 0 {
                    return Err(MatchmakingError::InvalidRequest {
                        reason: "Participant ID cannot be zero".to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(())
    }

    /// Serialize any AMQP message to bytes
    pub fn serialize_message<T: Serialize>(message: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(message).map_err(|e| {
            MatchmakingError::InternalError {
                message: format!("Failed to serialize message: {}", e),
            }
            .into()
        })
    }

    /// Parse a client reply
    pub fn deserialize_client_reply(bytes: &[u8]) -> std::result::Result<ClientReply, String> {
        serde_json::from_slice(bytes).map_err(|e| format!("Failed to parse client reply: {}", e))
    }

    /// Get routing key for an event
    pub fn get_routing_key(event: &LobbyEvent) -> &'static str {
        match event {
            LobbyEvent::ParticipantJoined(_) => PARTICIPANT_JOINED_ROUTING_KEY,
            LobbyEvent::ParticipantLeft(_) => PARTICIPANT_LEFT_ROUTING_KEY,
            LobbyEvent::MatchStarted(_) => MATCH_STARTED_ROUTING_KEY,
            LobbyEvent::MatchFinished(_) => MATCH_FINISHED_ROUTING_KEY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_join_request() -> IntakeRequest {
        IntakeRequest::Join(JoinRequest {
            name: "alice".to_string(),
            difficulty: Difficulty::Easy,
            opponent: OpponentKind::Automated,
            client_queue: "nim_client.alice".to_string(),
            timestamp: chrono::Utc::now(),
        })
    }

    #[test]
    fn test_message_envelope_creation() {
        let envelope = MessageEnvelope::new(create_test_join_request(), "test.key".to_string());

        assert_eq!(envelope.routing_key, "test.key");
        assert!(!envelope.correlation_id.is_empty());
    }

    #[test]
    fn test_intake_request_validation() {
        assert!(MessageUtils::validate_intake_request(&create_test_join_request()).is_ok());

        let mut request = create_test_join_request();
        if let IntakeRequest::Join(join) = &mut request {
            join.name = "   ".to_string();
        }
        assert!(MessageUtils::validate_intake_request(&request).is_err());

        let mut request = create_test_join_request();
        if let IntakeRequest::Join(join) = &mut request {
            join.client_queue.clear();
        }
        assert!(MessageUtils::validate_intake_request(&request).is_err());

        let leave = IntakeRequest::Leave(LeaveRequest {
            participant_id: 0,
            timestamp: chrono::Utc::now(),
        });
        assert!(MessageUtils::validate_intake_request(&leave).is_err());
    }

    #[test]
    fn test_intake_request_wire_format() {
        let bytes = br#"{"type":"Join","name":"bob","difficulty":"hard","opponent":"human","client_queue":"q.bob","timestamp":"2024-01-01T00:00:00Z"}"#;
        let request = MessageUtils::deserialize_intake_request(bytes).unwrap();

        match request {
            IntakeRequest::Join(join) => {
                assert_eq!(join.name, "bob");
                assert_eq!(join.difficulty, Difficulty::Hard);
                assert_eq!(join.opponent, OpponentKind::Human);
            }
            other => panic!("unexpected request: {:?}", other),
        }

        let bytes = br#"{"type":"Requeue","participant_id":7,"timestamp":"2024-01-01T00:00:00Z"}"#;
        assert!(matches!(
            MessageUtils::deserialize_intake_request(bytes).unwrap(),
            IntakeRequest::Requeue(RequeueRequest { participant_id: 7, .. })
        ));

        assert!(MessageUtils::deserialize_intake_request(b"not json").is_err());
    }

    #[test]
    fn test_client_call_format() {
        let call = ClientCall::RequestMove { pool: 12 };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["call"], "request_move");
        assert_eq!(json["pool"], 12);
        assert!(call.expects_reply());

        let call = ClientCall::Deliver {
            message: LobbyMessage::AwaitingOpponent,
        };
        assert!(!call.expects_reply());
        assert_eq!(call.operation(), "deliver");
    }

    #[test]
    fn test_client_reply_parsing() {
        assert_eq!(
            MessageUtils::deserialize_client_reply(br#"{"reply":"move","take":3}"#),
            Ok(ClientReply::Move { take: 3 })
        );
        assert_eq!(
            MessageUtils::deserialize_client_reply(br#"{"reply":"rematch","accept":false}"#),
            Ok(ClientReply::Rematch { accept: false })
        );
        assert!(MessageUtils::deserialize_client_reply(b"{}").is_err());
    }

    #[test]
    fn test_routing_key_generation() {
        let event = LobbyEvent::ParticipantLeft(ParticipantLeft {
            participant_id: 3,
            reason: LeaveReason::Declined,
            timestamp: chrono::Utc::now(),
        });
        assert_eq!(
            MessageUtils::get_routing_key(&event),
            PARTICIPANT_LEFT_ROUTING_KEY
        );
    }
}
