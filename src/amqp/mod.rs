//! AMQP integration for the lobby service
//!
//! Intake consumption, event publishing and the request/reply calls the match
//! engine makes to remote participants.

pub mod connection;
pub mod handlers;
pub mod messages;
pub mod publisher;
pub mod rpc;

// Re-export commonly used types
pub use connection::{AmqpConfig, AmqpConnection};
pub use handlers::{ClientFactory, IntakeConsumer, LobbyIntakeHandler, MessageHandler};
pub use messages::*;
pub use publisher::{EventPublisher, LoggingEventPublisher, MockEventPublisher, PublisherConfig};
pub use rpc::{AmqpRemoteClient, RpcDispatcher};
