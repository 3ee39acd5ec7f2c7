//! Queue Worker Framework
//!
//! Reliable message-queue transport for submitting work to a single
//! well-known broker queue and processing it in the background.
//!
//! ## Features
//!
//! - **Connection manager**: retries broker connection with a fixed delay until
//!   it succeeds or the cancellation token fires, then declares the queue
//! - **Publisher**: one shared channel, every publish serialized through a lock
//! - **Consumer loop**: explicit `Connecting → Subscribed → Cancelled` state
//!   machine, per-delivery ack / nack-with-requeue (at-least-once)
//! - **Pluggable broker**: `AmqpBroker` (RabbitMQ via lapin) and `MemoryBroker`
//! - **Prometheus metrics** and K8s-style health endpoints
//!
//! ## Example
//!
//! ```rust,ignore
//! use queue_worker::{AmqpBroker, ConsumerLoop, QueueDef, WorkerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! struct OrderQueue;
//! impl QueueDef for OrderQueue {
//!     const QUEUE_NAME: &'static str = "orders-queue";
//! }
//!
//! let config = WorkerConfig::from_queue_def::<OrderQueue>()
//!     .with_broker_uri("amqp://localhost:5672/%2f");
//! let consumer = ConsumerLoop::new(Arc::new(AmqpBroker::new()), processor, config);
//! consumer.run(CancellationToken::new()).await?;
//! ```

mod amqp;
mod broker;
mod config;
mod connection;
mod consumer;
mod error;
mod event;
mod health;
pub mod memory;
pub mod metrics;
mod publisher;
mod registry;
mod shutdown;

// Re-export main types
pub use amqp::AmqpBroker;
pub use broker::{Broker, BrokerChannel, DeliveryStream, QueueOptions};
pub use config::WorkerConfig;
pub use connection::ConnectionManager;
pub use consumer::{ConsumerLoop, ConsumerState};
pub use error::{ErrorCategory, QueueError};
pub use event::Delivery;
pub use health::{health_router, HealthState, Readiness};
pub use memory::{MemoryBroker, MemoryStats};
pub use metrics::{init_metrics, QueueMetrics};
pub use publisher::Publisher;
pub use registry::{QueueDef, QueueJob, QueueProcessor};
pub use shutdown::{cancel_on_shutdown, shutdown_signal};

/// Cancellation handle threaded through every suspension point.
pub use tokio_util::sync::CancellationToken;
