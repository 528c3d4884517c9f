//! Metrics and monitoring for the nim-lobby service
//!
//! Prometheus collectors for the lobby, the matches it runs and the AMQP
//! plumbing, plus the HTTP server that exposes them.

pub mod collector;
pub mod health;

pub use collector::{
    GameMetrics, LobbyMetrics, MetricsCollector, MetricsTimer, PerformanceMetrics, ServiceMetrics,
};
pub use health::{HealthEndpoints, HealthServer, HealthServerConfig};
