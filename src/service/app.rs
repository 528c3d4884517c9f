//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the matchmaker to
//! AMQP, runs its loop and the background tasks, and shuts them down.

use crate::amqp::connection::{AmqpConfig, AmqpConnection};
use crate::amqp::handlers::{ClientFactory, IntakeConsumer, LobbyIntakeHandler};
use crate::amqp::publisher::{
    AmqpEventPublisher, EventPublisher, LoggingEventPublisher, PublisherConfig,
};
use crate::amqp::rpc::{AmqpRemoteClient, RpcDispatcher};
use crate::bot::ComputerOpponentProvider;
use crate::config::AppConfig;
use crate::lobby::{Matchmaker, QueueOrderMatcher};
use crate::metrics::{HealthServer, HealthServerConfig, MetricsCollector};
use crate::player::RemoteClient;
use crate::service::health::HealthCheck;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Broker-side components, absent when AMQP is disabled
struct AmqpComponents {
    connection: Arc<AmqpConnection>,
    dispatcher: Arc<RpcDispatcher>,
    publisher: Arc<dyn EventPublisher>,
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,

    matchmaker: Arc<Matchmaker>,
    metrics_collector: Arc<MetricsCollector>,

    amqp_connection: Option<Arc<AmqpConnection>>,
    rpc_dispatcher: Option<Arc<RpcDispatcher>>,

    intake_consumer: Mutex<Option<IntakeConsumer>>,
    health_server: Mutex<Option<Arc<HealthServer>>>,
    matchmaker_task: Mutex<Option<JoinHandle<()>>>,
    background_tasks: Mutex<Vec<JoinHandle<()>>>,

    /// Flipped to true to stop the matchmaker loop
    shutdown_tx: watch::Sender<bool>,
    is_running: Arc<RwLock<bool>>,
    started_at: Instant,
}

impl AppState {
    /// Initialize the application with all dependencies
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing nim-lobby service");
        info!(
            "Configuration: service={}, amqp_enabled={}, amqp_url={}",
            config.service.name, config.amqp.enabled, config.amqp.url
        );

        crate::config::validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        let metrics_collector = Self::initialize_metrics()?;

        let amqp = if config.amqp.enabled {
            Some(Self::initialize_amqp(&config, metrics_collector.clone()).await?)
        } else {
            warn!("AMQP disabled - no intake consumer, events are only logged");
            None
        };

        let event_publisher: Arc<dyn EventPublisher> = match &amqp {
            Some(components) => components.publisher.clone(),
            None => Arc::new(LoggingEventPublisher::new()),
        };

        let matchmaker = Arc::new(Matchmaker::with_components(
            event_publisher,
            metrics_collector.clone(),
            config.matchmaker_config(),
            Arc::new(QueueOrderMatcher::new()),
            Arc::new(ComputerOpponentProvider::with_name(
                config.lobby.computer_name.clone(),
            )),
        ));

        let (shutdown_tx, _) = watch::channel(false);
        let (amqp_connection, rpc_dispatcher) = match amqp {
            Some(components) => (Some(components.connection), Some(components.dispatcher)),
            None => (None, None),
        };

        Ok(Self {
            config,
            matchmaker,
            metrics_collector,
            amqp_connection,
            rpc_dispatcher,
            intake_consumer: Mutex::new(None),
            health_server: Mutex::new(None),
            matchmaker_task: Mutex::new(None),
            background_tasks: Mutex::new(Vec::new()),
            shutdown_tx,
            is_running: Arc::new(RwLock::new(false)),
            started_at: Instant::now(),
        })
    }

    /// Start the health endpoints, the matchmaker loop, intake and background tasks
    pub async fn start(self: &Arc<Self>) -> Result<(), ServiceError> {
        info!("Starting nim-lobby service");

        *self.is_running.write().await = true;

        self.start_health_server().await?;
        self.start_matchmaker().await;

        if self.rpc_dispatcher.is_some() {
            self.start_amqp_consumption().await?;
        }

        self.start_background_tasks().await;

        info!("✅ nim-lobby service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    ///
    /// Intake stops first so no participant registers while the loop winds
    /// down. Matches already running finish on their own tasks.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of nim-lobby service");

        *self.is_running.write().await = false;

        let consumer = self.intake_consumer.lock().await.take();
        if let Some(consumer) = consumer {
            match consumer.stop_consuming().await {
                Ok(()) => info!("✅ AMQP intake consumption stopped"),
                Err(e) => warn!("Failed to stop AMQP consumer: {}", e),
            }
        }

        let _ = self.shutdown_tx.send(true);
        let task = self.matchmaker_task.lock().await.take();
        if let Some(task) = task {
            match tokio::time::timeout(self.config.shutdown_timeout(), task).await {
                Ok(Ok(())) => info!("✅ Matchmaker loop stopped"),
                Ok(Err(e)) => warn!("Matchmaker loop ended abnormally: {}", e),
                Err(_) => warn!("Matchmaker loop did not stop within the shutdown timeout"),
            }
        }

        let server = self.health_server.lock().await.take();
        if let Some(server) = server {
            if let Err(e) = server.stop().await {
                warn!("Failed to stop health server: {}", e);
            }
        }

        self.stop_background_tasks().await;

        let final_stats =
            self.matchmaker
                .get_stats()
                .map_err(|e| ServiceError::BackgroundTask {
                    message: format!("Failed to get final stats: {}", e),
                })?;
        info!("Final service statistics: {:?}", final_stats);

        if let Some(connection) = &self.amqp_connection {
            if let Err(e) = connection.close().await {
                warn!("Failed to close AMQP connection: {}", e);
            }
        }

        info!("✅ nim-lobby service shutdown completed");
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn matchmaker(&self) -> Arc<Matchmaker> {
        self.matchmaker.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    /// AMQP connection, if the service runs with a broker
    pub fn amqp_connection(&self) -> Option<&Arc<AmqpConnection>> {
        self.amqp_connection.as_ref()
    }

    /// Whether the matchmaker loop task has been spawned and is still running
    pub async fn matchmaker_loop_alive(&self) -> bool {
        self.matchmaker_task
            .lock()
            .await
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn initialize_metrics() -> Result<Arc<MetricsCollector>, ServiceError> {
        MetricsCollector::new()
            .map(Arc::new)
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {}", e),
            })
    }

    /// Connect to the broker and set up the publisher and the reply dispatcher
    async fn initialize_amqp(
        config: &AppConfig,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Result<AmqpComponents, ServiceError> {
        info!("Connecting to AMQP broker: {}", config.amqp.url);

        let mut amqp_config =
            AmqpConfig::from_url(&config.amqp.url).map_err(|e| ServiceError::Configuration {
                message: format!("Failed to parse AMQP URL: {}", e),
            })?;
        amqp_config.max_retries = config.amqp.max_retry_attempts;
        amqp_config.retry_delay_ms = config.amqp.retry_delay_ms;
        amqp_config.connection_timeout_ms = config.amqp_connection_timeout().as_millis() as u64;

        let connection = Arc::new(AmqpConnection::new(amqp_config).await.map_err(|e| {
            ServiceError::AmqpConnection {
                message: format!("Failed to connect to AMQP: {}", e),
            }
        })?);

        let publisher_channel =
            connection
                .open_channel()
                .await
                .map_err(|e| ServiceError::AmqpConnection {
                    message: e.to_string(),
                })?;
        let publisher_config = PublisherConfig {
            exchange_name: config.amqp.exchange_name.clone(),
            max_retries: config.amqp.max_retry_attempts,
            retry_delay_ms: config.amqp.retry_delay_ms,
            ..PublisherConfig::default()
        };
        let publisher = AmqpEventPublisher::new(publisher_channel, publisher_config)
            .await
            .map_err(|e| ServiceError::Initialization {
                message: format!("Failed to initialize event publisher: {}", e),
            })?;

        let rpc_channel = connection
            .open_channel()
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: e.to_string(),
            })?;
        let dispatcher =
            RpcDispatcher::new(rpc_channel, config.reply_timeout(), Some(metrics_collector))
                .await
                .map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to initialize reply dispatcher: {}", e),
                })?;

        info!(
            "AMQP ready - events on '{}', replies on '{}'",
            config.amqp.exchange_name,
            dispatcher.reply_queue()
        );

        Ok(AmqpComponents {
            connection,
            dispatcher,
            publisher: Arc::new(publisher),
        })
    }

    async fn start_health_server(self: &Arc<Self>) -> Result<(), ServiceError> {
        let port = self.config.service.health_port;
        info!("Starting health and metrics endpoints on port {}", port);

        let server = Arc::new(
            HealthServer::new(
                HealthServerConfig {
                    port,
                    host: "0.0.0.0".to_string(),
                },
                self.metrics_collector.clone(),
            )
            .with_app_state(self.clone()),
        );

        let task = {
            let server = server.clone();
            tokio::spawn(async move {
                if let Err(e) = server.start().await {
                    error!("Health server failed: {}", e);
                }
            })
        };

        *self.health_server.lock().await = Some(server);
        self.background_tasks.lock().await.push(task);
        Ok(())
    }

    async fn start_matchmaker(&self) {
        let task = self.matchmaker.clone().start(self.shutdown_tx.subscribe());
        *self.matchmaker_task.lock().await = Some(task);
    }

    /// Declare the intake queue and consume join, leave and requeue requests
    async fn start_amqp_consumption(&self) -> Result<(), ServiceError> {
        let (Some(connection), Some(dispatcher)) = (&self.amqp_connection, &self.rpc_dispatcher)
        else {
            return Ok(());
        };
        let queue_name = self.config.amqp.queue_name.as_str();

        info!("Starting AMQP intake consumption...");
        let channel = connection
            .open_channel()
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open consumer channel: {}", e),
            })?;

        let queue_declare_args = amqprs::channel::QueueDeclareArguments::new(queue_name)
            .durable(true)
            .auto_delete(false)
            .finish();
        channel
            .queue_declare(queue_declare_args)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to declare queue {}: {}", queue_name, e),
            })?;
        info!("Queue '{}' declared successfully", queue_name);

        let clients: ClientFactory = {
            let dispatcher = dispatcher.clone();
            Arc::new(move |client_queue: &str| -> Arc<dyn RemoteClient> {
                Arc::new(AmqpRemoteClient::new(dispatcher.clone(), client_queue))
            })
        };

        let handler = Arc::new(LobbyIntakeHandler::new(
            self.matchmaker.clone(),
            clients,
            self.config.lobby.max_move_attempts,
            self.metrics_collector.clone(),
        ));

        let consumer = IntakeConsumer::new(handler, channel);
        consumer
            .start_consuming(queue_name)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to start consuming intake requests: {}", e),
            })?;

        *self.intake_consumer.lock().await = Some(consumer);

        info!(
            "AMQP intake consumption started on queue: '{}'",
            queue_name
        );
        Ok(())
    }

    /// Start the periodic metrics refresh tasks
    async fn start_background_tasks(self: &Arc<Self>) {
        let stats_task = {
            let matchmaker = self.matchmaker.clone();
            let metrics_collector = self.metrics_collector.clone();
            let is_running = self.is_running.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(30));

                while *is_running.read().await {
                    interval.tick().await;

                    match matchmaker.get_stats() {
                        Ok(stats) => {
                            debug!(
                                "Updating metrics - live: {}, waiting: {}, active matches: {}",
                                stats.participants_live,
                                stats.participants_waiting,
                                stats.active_matches
                            );
                            metrics_collector.update_from_stats(&stats);
                        }
                        Err(e) => warn!("Failed to get matchmaker stats for metrics update: {}", e),
                    }
                }
            })
        };

        let health_metrics_task = {
            let app_state = self.clone();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(60));

                while app_state.is_running().await {
                    interval.tick().await;

                    let metrics_collector = app_state.metrics();
                    metrics_collector
                        .service()
                        .uptime_seconds
                        .set(app_state.uptime().as_secs() as i64);

                    match HealthCheck::check(app_state.clone()).await {
                        Ok(health) => {
                            metrics_collector.update_health_status(health.status.as_gauge());
                            for check in &health.checks {
                                metrics_collector.update_component_health(
                                    &check.name,
                                    check.status.as_gauge() > 0,
                                );
                            }
                        }
                        Err(e) => warn!("Health metrics update failed: {}", e),
                    }
                }
            })
        };

        let mut tasks = self.background_tasks.lock().await;
        tasks.push(stats_task);
        tasks.push(health_metrics_task);
        info!("{} background tasks running", tasks.len());
    }

    async fn stop_background_tasks(&self) {
        let tasks: Vec<_> = self.background_tasks.lock().await.drain(..).collect();
        if tasks.is_empty() {
            return;
        }

        info!("Stopping {} background tasks...", tasks.len());
        for task in tasks {
            task.abort();
            let _ = task.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.amqp.enabled = false;
        config.service.health_port = 18_181;
        config.lobby.cycle_period_ms = 20;
        config
    }

    #[tokio::test]
    async fn test_offline_start_and_shutdown() {
        let app_state = Arc::new(AppState::new(offline_config()).await.unwrap());
        assert!(!app_state.is_running().await);
        assert!(app_state.amqp_connection().is_none());

        app_state.start().await.unwrap();
        assert!(app_state.is_running().await);
        assert!(app_state.matchmaker_loop_alive().await);

        app_state.shutdown().await.unwrap();
        assert!(!app_state.is_running().await);
        assert!(!app_state.matchmaker_loop_alive().await);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = offline_config();
        config.lobby.easy_pool_min = 0;

        let result = AppState::new(config).await;
        assert!(matches!(result, Err(ServiceError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_offline_lobby_plays_computer_match() {
        use crate::bot::ComputerPlayer;
        use crate::types::Difficulty;

        let app_state = Arc::new(AppState::new(offline_config()).await.unwrap());
        let matchmaker = app_state.matchmaker();

        matchmaker
            .register(Arc::new(ComputerPlayer::new(Difficulty::Easy)))
            .await
            .unwrap();
        matchmaker
            .register(Arc::new(ComputerPlayer::new(Difficulty::Easy)))
            .await
            .unwrap();

        let report = matchmaker.run_cycle().unwrap();
        assert_eq!(report.launched.len(), 1);
        for launched in report.launched {
            launched.handle.await.unwrap();
        }

        let stats = matchmaker.get_stats().unwrap();
        assert_eq!(stats.matches_started, 1);
    }
}
