//! Configuration management for the nim-lobby service
//!
//! Configuration comes from a TOML file or from defaults, with environment
//! variables and command-line flags layered on top.

pub mod app;

// Re-export commonly used types
pub use app::{validate_config, AmqpSettings, AppConfig, LobbySettings, ServiceSettings};
