//! Orders Domain
//!
//! The order record exchanged over the queue transport, plus both ends of
//! that exchange.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  ← HTTP endpoints (gateway)
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │  Submitter  │  ← validation, publish, immediate ack
//! └──────┬──────┘
//!        │  orders-queue
//! ┌──────▼──────┐
//! │  Processor  │  ← consumer side (processing worker)
//! └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_orders::{handlers, OrderQueue, OrderSettings, OrderSubmitter};
//! use queue_worker::{Publisher, WorkerConfig};
//!
//! let publisher = Publisher::connect(&manager, &cancel).await?;
//! let router = handlers::router(OrderSubmitter::new(publisher, OrderSettings::default()));
//! ```

pub mod error;
pub mod handlers;
pub mod models;
pub mod processor;
pub mod queue;
pub mod settings;
pub mod submit;

// Re-export commonly used types
pub use error::{OrderError, OrderResult};
pub use models::{OrderId, OrderRecord, SubmitAck, SubmitOrder};
pub use processor::OrderProcessor;
pub use queue::OrderQueue;
pub use settings::OrderSettings;
pub use submit::OrderSubmitter;
