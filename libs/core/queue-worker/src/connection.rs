//! Broker connection manager
//!
//! Hides transient broker unavailability: connection attempts that fail are
//! logged and retried after a fixed delay, forever, until one succeeds or the
//! cancellation token fires. The queue is declared before the channel is
//! handed out.

use crate::broker::{Broker, BrokerChannel, QueueOptions};
use crate::config::WorkerConfig;
use crate::error::QueueError;
use crate::metrics::QueueMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Produces ready-to-use channels on the configured queue.
///
/// Each call to [`connect`](Self::connect) opens an independent connection,
/// so the publishing and consuming sides never share a channel.
#[derive(Clone)]
pub struct ConnectionManager {
    broker: Arc<dyn Broker>,
    uri: String,
    queue_name: String,
    queue_options: QueueOptions,
    retry_interval: Duration,
    metrics: QueueMetrics,
}

impl ConnectionManager {
    pub fn new(broker: Arc<dyn Broker>, config: &WorkerConfig) -> Self {
        Self {
            broker,
            uri: config.broker_uri.clone(),
            queue_name: config.queue_name.clone(),
            queue_options: config.queue_options,
            retry_interval: config.retry_interval(),
            metrics: QueueMetrics::new(&config.queue_name),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Connect, retrying with a fixed delay, then declare the queue.
    ///
    /// # Errors
    ///
    /// - `QueueError::Cancelled` if `cancel` fires before a connection is made
    /// - `QueueError::FatalSetup` if the queue declaration fails; not retried
    #[instrument(skip(self, cancel), fields(broker = self.broker.name(), queue = %self.queue_name))]
    pub async fn connect(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn BrokerChannel>, QueueError> {
        let mut attempt: u32 = 0;

        let channel = loop {
            if cancel.is_cancelled() {
                return Err(QueueError::Cancelled);
            }
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(QueueError::Cancelled),
                result = self.broker.connect(&self.uri) => result,
            };

            match result {
                Ok(channel) => {
                    self.metrics.connect_attempt(true);
                    break channel;
                }
                Err(e) => {
                    self.metrics.connect_attempt(false);
                    warn!(
                        attempt,
                        error = %e,
                        retry_in_ms = self.retry_interval.as_millis() as u64,
                        "Broker not ready, retrying"
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => return Err(QueueError::Cancelled),
                        _ = tokio::time::sleep(self.retry_interval) => {}
                    }
                }
            }
        };

        if let Err(e) = channel
            .declare_queue(&self.queue_name, self.queue_options)
            .await
        {
            let _ = channel.close().await;
            return Err(QueueError::FatalSetup(format!(
                "failed to declare queue '{}': {}",
                self.queue_name, e
            )));
        }

        info!(attempts = attempt, "Connected to broker and declared queue");
        Ok(channel)
    }
}
