//! Benchmark Gateway
//!
//! Accepts order submissions over HTTP and publishes them to the orders
//! queue without waiting for them to be processed.
//!
//! ## Architecture
//!
//! ```text
//! POST /api/benchmark/rabbitmq ─┐
//! POST /api/orders ─────────────┤
//!                               ▼
//!                     OrderSubmitter → Publisher (one shared channel)
//!                                        ↓
//!                                   orders-queue → processing worker
//! ```

use axum::Router;
use core_config::rabbitmq::RabbitMqConfig;
use core_config::server::ServerConfig;
use core_config::{Environment, FromEnv};
use domain_orders::{OrderQueue, OrderSettings, OrderSubmitter, handlers};
use eyre::{Result, WrapErr};
use queue_worker::{
    AmqpBroker, CancellationToken, ConnectionManager, HealthState, Publisher, Readiness,
    WorkerConfig, cancel_on_shutdown, health_router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, warn};

/// Build the gateway router: order endpoints, health probes and metrics.
pub fn app(submitter: OrderSubmitter, health_state: HealthState) -> Router {
    handlers::router(submitter)
        .merge(health_router(health_state))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Run the gateway
///
/// 1. Sets up error reports, tracing and metrics
/// 2. Connects the publisher (retrying until RabbitMQ is reachable)
/// 3. Serves HTTP until SIGINT/SIGTERM
///
/// # Errors
///
/// Returns an error if configuration is invalid, the orders queue cannot
/// be declared, or the HTTP listener fails.
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    queue_worker::init_metrics().wrap_err("Failed to initialize metrics")?;

    let name = env!("CARGO_PKG_NAME");
    let version = env!("CARGO_PKG_VERSION");
    info!(name, version, environment = ?environment, "Starting benchmark gateway");

    let server_config = ServerConfig::from_env().wrap_err("Failed to load server configuration")?;
    let rabbit_config =
        RabbitMqConfig::from_env().wrap_err("Failed to load RabbitMQ configuration")?;
    let settings = OrderSettings::from_env().wrap_err("Failed to load order settings")?;

    let queue_config = WorkerConfig::from_queue_def::<OrderQueue>()
        .with_broker_uri(rabbit_config.uri())
        .with_retry_interval_ms(rabbit_config.retry_interval_ms);

    let cancel = CancellationToken::new();
    cancel_on_shutdown(cancel.clone());

    let manager = ConnectionManager::new(Arc::new(AmqpBroker::new()), &queue_config);
    info!(host = %rabbit_config.host, queue = %queue_config.queue_name, "Connecting publisher...");
    let publisher = match Publisher::connect(&manager, &cancel).await {
        Ok(publisher) => publisher,
        Err(e) if e.is_cancelled() => {
            info!("Shutdown requested before RabbitMQ was reachable");
            return Ok(());
        }
        Err(e) => return Err(e).wrap_err("Failed to set up the orders queue"),
    };

    let health_state = HealthState::new(
        name,
        version,
        queue_config.queue_name.clone(),
        Readiness::Publisher(publisher.clone()),
    );
    let router = app(OrderSubmitter::new(publisher.clone(), settings), health_state);

    let listener = TcpListener::bind(server_config.address())
        .await
        .wrap_err_with(|| format!("Failed to bind to {}", server_config.address()))?;
    info!(address = %listener.local_addr()?, "Gateway listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(cancel.clone().cancelled_owned())
        .await
        .wrap_err("Gateway server failed")?;

    if let Err(e) = publisher.close().await {
        warn!(error = %e, "Error closing publisher channel");
    }

    info!("Benchmark gateway stopped");
    Ok(())
}
