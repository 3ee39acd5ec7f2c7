//! Broker client abstraction
//!
//! The transport only needs a small slice of a message broker: connect,
//! declare a queue, publish to it through the default exchange, subscribe,
//! and settle individual deliveries. Keeping that slice behind traits lets
//! the AMQP client and the in-memory broker be swapped freely.

use crate::error::QueueError;
use crate::event::Delivery;
use async_trait::async_trait;
use std::sync::Arc;

/// Queue declaration arguments.
///
/// The default is non-durable, non-exclusive and not auto-deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOptions {
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
}

/// Something that can open a connection and hand back a channel on it.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Open one physical connection and a channel on it.
    async fn connect(&self, uri: &str) -> Result<Arc<dyn BrokerChannel>, QueueError>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// A channel derived from a broker connection.
///
/// Channels are not assumed to tolerate concurrent use; callers that share
/// one must serialize access (see `Publisher`).
#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Declare a queue. Redeclaring with equal options is a no-op.
    async fn declare_queue(&self, queue: &str, options: QueueOptions) -> Result<(), QueueError>;

    /// Publish through the default exchange with `queue` as routing key.
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), QueueError>;

    /// Start a manual-ack subscription.
    async fn subscribe(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<Box<dyn DeliveryStream>, QueueError>;

    /// Acknowledge exactly this delivery.
    async fn ack(&self, delivery_tag: u64) -> Result<(), QueueError>;

    /// Negatively acknowledge exactly this delivery.
    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), QueueError>;

    /// Close the channel and its connection. Unsettled deliveries go back to the queue.
    async fn close(&self) -> Result<(), QueueError>;

    /// Whether the channel and its connection are still usable.
    fn is_open(&self) -> bool;
}

/// Stream of deliveries for one subscription.
///
/// `None` means the subscription is gone (channel or connection closed).
#[async_trait]
pub trait DeliveryStream: Send {
    async fn next(&mut self) -> Option<Result<Delivery, QueueError>>;
}
