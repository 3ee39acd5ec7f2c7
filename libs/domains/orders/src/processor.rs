//! Order processor for the consumer loop.
//!
//! Stands in for real downstream work: logs the order and holds it for a
//! short, bounded delay before reporting success.

use crate::models::OrderRecord;
use crate::settings::OrderSettings;
use async_trait::async_trait;
use queue_worker::{QueueError, QueueProcessor};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct OrderProcessor {
    processing_delay: Duration,
}

impl OrderProcessor {
    pub fn new(processing_delay: Duration) -> Self {
        Self { processing_delay }
    }

    pub fn from_settings(settings: &OrderSettings) -> Self {
        Self::new(settings.processing_delay())
    }

    pub fn processing_delay(&self) -> Duration {
        self.processing_delay
    }
}

impl Default for OrderProcessor {
    fn default() -> Self {
        Self::from_settings(&OrderSettings::default())
    }
}

#[async_trait]
impl QueueProcessor<OrderRecord> for OrderProcessor {
    async fn process(&self, order: &OrderRecord) -> Result<(), QueueError> {
        info!(
            order_id = %order.id(),
            customer_id = %order.customer_id(),
            value = %order.value(),
            payload_bytes = order.payload().len(),
            "Order received"
        );

        if !self.processing_delay.is_zero() {
            tokio::time::sleep(self.processing_delay).await;
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "OrderProcessor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_process_waits_for_simulated_delay() {
        let processor = OrderProcessor::default();
        let order = OrderRecord::benchmark(8);

        let started = tokio::time::Instant::now();
        processor.process(&order).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(10));
        assert_eq!(processor.name(), "OrderProcessor");
    }

    #[tokio::test]
    async fn test_zero_delay() {
        let processor = OrderProcessor::new(Duration::ZERO);
        assert!(processor.process(&OrderRecord::benchmark(0)).await.is_ok());
    }
}
