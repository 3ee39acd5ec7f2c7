//! Processing Worker Service
//!
//! Consumes orders published by the gateway and settles each one with the
//! broker.
//!
//! ## Architecture
//!
//! ```text
//! RabbitMQ (orders-queue)
//!   ↓ (manual ack, prefetch)
//! ConsumerLoop<OrderRecord, OrderProcessor>
//!   ↓ success → ack / failure → nack + requeue
//! ```
//!
//! ## Features
//!
//! - Waits for RabbitMQ at startup (fixed 3s retry) and reconnects if the
//!   connection drops
//! - Bounded concurrent processing
//! - Graceful shutdown: in-flight orders are settled before exit
//! - Health and metrics endpoints for Kubernetes probes and Prometheus

use axum::Router;
use core_config::rabbitmq::RabbitMqConfig;
use core_config::server::ServerConfig;
use core_config::{ConfigError, Environment, FromEnv, env_parse_or};
use domain_orders::{OrderProcessor, OrderQueue, OrderRecord, OrderSettings};
use eyre::{Result, WrapErr};
use queue_worker::{
    AmqpBroker, CancellationToken, ConsumerLoop, HealthState, Readiness, WorkerConfig,
    cancel_on_shutdown, health_router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Default number of orders processed at once
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 16;

/// Consumer configuration from the RabbitMQ settings plus
/// `WORKER_MAX_CONCURRENT_JOBS` and `WORKER_CONSUMER_TAG`.
pub fn worker_config(rabbit: &RabbitMqConfig) -> Result<WorkerConfig, ConfigError> {
    let mut config = WorkerConfig::from_queue_def::<OrderQueue>()
        .with_broker_uri(rabbit.uri())
        .with_retry_interval_ms(rabbit.retry_interval_ms)
        .with_max_concurrent_jobs(env_parse_or(
            "WORKER_MAX_CONCURRENT_JOBS",
            DEFAULT_MAX_CONCURRENT_JOBS,
        )?);

    if let Ok(tag) = std::env::var("WORKER_CONSUMER_TAG") {
        config = config.with_consumer_tag(tag);
    }

    Ok(config)
}

/// Start the health HTTP server
///
/// - Liveness probes: `/health`, `/healthz`
/// - Readiness probes: `/ready`, `/readyz` (ready while subscribed)
/// - Prometheus metrics: `/metrics`
async fn start_health_server(
    health_state: HealthState,
    config: ServerConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let app: Router = health_router(health_state);

    let listener = TcpListener::bind(config.address())
        .await
        .wrap_err_with(|| format!("Failed to bind health server to {}", config.address()))?;

    info!(port = config.port, "Health server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .wrap_err("Health server failed")?;

    Ok(())
}

/// Run the processing worker
///
/// 1. Sets up error reports, tracing and metrics
/// 2. Starts the health server
/// 3. Runs the consumer loop until SIGINT/SIGTERM
///
/// # Errors
///
/// Returns an error if configuration is invalid or the orders queue cannot
/// be declared or subscribed to.
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    queue_worker::init_metrics().wrap_err("Failed to initialize metrics")?;

    let name = env!("CARGO_PKG_NAME");
    let version = env!("CARGO_PKG_VERSION");
    info!(name, version, environment = ?environment, "Starting processing worker");

    let health_config =
        ServerConfig::health_from_env().wrap_err("Failed to load health server configuration")?;
    let rabbit_config =
        RabbitMqConfig::from_env().wrap_err("Failed to load RabbitMQ configuration")?;
    let settings = OrderSettings::from_env().wrap_err("Failed to load order settings")?;
    let worker_config =
        worker_config(&rabbit_config).wrap_err("Failed to load worker configuration")?;

    info!(
        host = %rabbit_config.host,
        queue = %worker_config.queue_name,
        consumer_tag = %worker_config.consumer_tag,
        max_concurrent_jobs = worker_config.max_concurrent_jobs,
        prefetch_count = rabbit_config.prefetch_count,
        processing_delay_ms = settings.processing_delay_ms,
        "Worker configuration loaded"
    );

    let cancel = CancellationToken::new();
    cancel_on_shutdown(cancel.clone());

    let broker = AmqpBroker::new().with_prefetch_count(rabbit_config.prefetch_count);
    let consumer = ConsumerLoop::<OrderRecord, _>::new(
        Arc::new(broker),
        OrderProcessor::from_settings(&settings),
        worker_config.clone(),
    );

    let health_state = HealthState::new(
        name,
        version,
        worker_config.queue_name.clone(),
        Readiness::Consumer(consumer.state()),
    );
    let health = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if let Err(e) = start_health_server(health_state, health_config, cancel).await {
                error!(error = %e, "Health server failed");
            }
        }
    });

    let result = consumer.run(cancel.clone()).await;

    // stop the health server on the error path too
    cancel.cancel();
    health.await.ok();

    result.wrap_err("Consumer loop failed")?;
    info!("Processing worker stopped");
    Ok(())
}
