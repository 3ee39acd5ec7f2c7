//! Fire-and-forget order submission.
//!
//! The submitter answers as soon as the publish call returns; whatever
//! happens to the order on the consumer side is never reported back.

use crate::error::{OrderError, OrderResult};
use crate::models::{OrderRecord, SubmitAck, SubmitOrder, synthetic_payload};
use crate::settings::{MAX_PAYLOAD_SIZE, OrderSettings};
use queue_worker::Publisher;
use rust_decimal::Decimal;
use tracing::info;

#[derive(Clone)]
pub struct OrderSubmitter {
    publisher: Publisher,
    settings: OrderSettings,
}

impl OrderSubmitter {
    pub fn new(publisher: Publisher, settings: OrderSettings) -> Self {
        Self {
            publisher,
            settings,
        }
    }

    pub fn settings(&self) -> &OrderSettings {
        &self.settings
    }

    /// Publish the fixed benchmark order
    pub async fn submit_benchmark(&self) -> OrderResult<SubmitAck> {
        self.publish(OrderRecord::benchmark(self.settings.payload_size))
            .await
    }

    /// Validate and publish a caller-described order
    pub async fn submit_order(&self, input: SubmitOrder) -> OrderResult<SubmitAck> {
        let customer_id = input.customer_id.trim();
        if customer_id.is_empty() {
            return Err(OrderError::Validation("customer_id must not be empty".into()));
        }
        if input.value < Decimal::ZERO {
            return Err(OrderError::Validation("value must not be negative".into()));
        }

        let payload_size = input.payload_size.unwrap_or(self.settings.payload_size);
        if payload_size > MAX_PAYLOAD_SIZE {
            return Err(OrderError::Validation(format!(
                "payload_size must be at most {} bytes",
                MAX_PAYLOAD_SIZE
            )));
        }

        self.publish(OrderRecord::new(
            customer_id,
            input.value,
            synthetic_payload(payload_size),
        ))
        .await
    }

    /// Publish an already-built order
    pub async fn publish(&self, order: OrderRecord) -> OrderResult<SubmitAck> {
        self.publisher.publish(&order).await?;

        info!(order_id = %order.id(), customer_id = %order.customer_id(), "Order published");
        Ok(SubmitAck::published(order.id()))
    }
}
