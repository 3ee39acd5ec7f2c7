//! Queue registry types and definitions.
//!
//! This module provides:
//! - `QueueDef` trait for domain-specific queue definitions
//! - `QueueJob` trait for message payloads (and their wire codec)
//! - `QueueProcessor` trait for the work done per delivery

use crate::broker::QueueOptions;
use crate::error::QueueError;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// Trait for queue definitions.
///
/// Producer and consumer both take the queue name from the same definition,
/// so declaring it from either side is the same idempotent operation.
///
/// # Example
///
/// ```rust,ignore
/// use queue_worker::QueueDef;
///
/// pub struct OrderQueue;
///
/// impl QueueDef for OrderQueue {
///     const QUEUE_NAME: &'static str = "orders-queue";
/// }
/// ```
pub trait QueueDef: Send + Sync {
    /// The broker queue name.
    const QUEUE_NAME: &'static str;

    /// Survive broker restarts. Default: false.
    const DURABLE: bool = false;

    /// Restrict to the declaring connection. Default: false.
    const EXCLUSIVE: bool = false;

    /// Delete when the last consumer goes away. Default: false.
    const AUTO_DELETE: bool = false;

    /// Get the queue name.
    fn queue_name() -> &'static str {
        Self::QUEUE_NAME
    }

    /// Declaration arguments for this queue.
    fn queue_options() -> QueueOptions {
        QueueOptions {
            durable: Self::DURABLE,
            exclusive: Self::EXCLUSIVE,
            auto_delete: Self::AUTO_DELETE,
        }
    }
}

/// Trait for queue message payloads.
///
/// The wire format is JSON; `decode(encode(x)) == x` must hold for every
/// field.
pub trait QueueJob: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Correlation key for logging and tracing.
    fn job_id(&self) -> String;

    /// Serialize to the bytes that go on the wire.
    fn encode(&self) -> Result<Vec<u8>, QueueError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize a delivered payload.
    fn decode(bytes: &[u8]) -> Result<Self, QueueError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Trait for job processors.
///
/// `Ok(())` acks the delivery; any `Err` nacks it with requeue so the broker
/// redelivers it.
///
/// ```rust,ignore
/// #[async_trait]
/// impl QueueProcessor<OrderRecord> for OrderProcessor {
///     async fn process(&self, order: &OrderRecord) -> Result<(), QueueError> {
///         tokio::time::sleep(self.delay).await;
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str {
///         "OrderProcessor"
///     }
/// }
/// ```
#[async_trait]
pub trait QueueProcessor<J: QueueJob>: Send + Sync {
    /// Process a single job.
    async fn process(&self, job: &J) -> Result<(), QueueError>;

    /// Get the processor name for logging.
    fn name(&self) -> &'static str;
}
