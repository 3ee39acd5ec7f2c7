//! Delivery wrapper
//!
//! One message handed to a consumer, with the broker metadata needed to
//! settle it.

use crate::error::QueueError;
use crate::registry::QueueJob;
use chrono::{DateTime, Utc};

/// A single delivery from the broker.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Broker-assigned handle used to ack/nack this delivery
    pub delivery_tag: u64,

    /// Raw message body
    pub payload: Vec<u8>,

    /// Set when the broker has delivered this message before
    pub redelivered: bool,

    /// When this process received it
    pub received_at: DateTime<Utc>,
}

impl Delivery {
    pub fn new(delivery_tag: u64, payload: Vec<u8>, redelivered: bool) -> Self {
        Self {
            delivery_tag,
            payload,
            redelivered,
            received_at: Utc::now(),
        }
    }

    /// Deserialize the payload. Each delivery attempt decodes the same bytes afresh.
    pub fn decode<J: QueueJob>(&self) -> Result<J, QueueError> {
        J::decode(&self.payload)
    }
}
