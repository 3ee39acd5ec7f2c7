//! Shared publisher
//!
//! One channel per process, shared by every caller. AMQP channels are not
//! safe for interleaved frames, so every publish goes through one lock; the
//! lock is released on both success and failure.

use crate::broker::BrokerChannel;
use crate::connection::ConnectionManager;
use crate::error::QueueError;
use crate::metrics::QueueMetrics;
use crate::registry::QueueJob;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

/// Cloneable handle for publishing jobs to one queue.
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<Inner>,
}

struct Inner {
    channel: Arc<dyn BrokerChannel>,
    /// Held for the whole of each publish and close
    lock: Mutex<()>,
    queue_name: String,
    metrics: QueueMetrics,
}

impl Publisher {
    /// Wrap an already-connected channel whose queue has been declared.
    pub fn new(channel: Arc<dyn BrokerChannel>, queue_name: impl Into<String>) -> Self {
        let queue_name = queue_name.into();
        Self {
            inner: Arc::new(Inner {
                channel,
                lock: Mutex::new(()),
                metrics: QueueMetrics::new(&queue_name),
                queue_name,
            }),
        }
    }

    /// Connect through the manager (retrying until the broker is up) and
    /// wrap the resulting channel.
    pub async fn connect(
        manager: &ConnectionManager,
        cancel: &CancellationToken,
    ) -> Result<Self, QueueError> {
        let channel = manager.connect(cancel).await?;
        Ok(Self::new(channel, manager.queue_name()))
    }

    pub fn queue_name(&self) -> &str {
        &self.inner.queue_name
    }

    /// Whether the shared channel can still publish. It is never
    /// re-established, so once this is false every publish fails.
    pub fn is_connected(&self) -> bool {
        self.inner.channel.is_open()
    }

    /// Serialize `job` and publish it.
    ///
    /// Fire-and-forget: success means the broker client accepted the frame,
    /// not that the message was persisted. Serialization failures are
    /// reported before anything is sent.
    #[instrument(skip(self, job), fields(queue = %self.inner.queue_name, job_id = %job.job_id()))]
    pub async fn publish<J: QueueJob>(&self, job: &J) -> Result<(), QueueError> {
        let payload = job.encode()?;
        self.publish_bytes(&payload).await?;
        debug!(bytes = payload.len(), "Job published");
        Ok(())
    }

    /// Publish a pre-encoded payload.
    pub async fn publish_bytes(&self, payload: &[u8]) -> Result<(), QueueError> {
        let result = {
            let _guard = self.inner.lock.lock().await;
            self.inner.channel.publish(&self.inner.queue_name, payload).await
        };

        match result {
            Ok(()) => {
                self.inner.metrics.published(true, payload.len());
                Ok(())
            }
            Err(e) => {
                self.inner.metrics.published(false, payload.len());
                error!(queue = %self.inner.queue_name, error = %e, "Publish failed");
                Err(match e {
                    QueueError::Transport(_) => e,
                    other => QueueError::transport(other.to_string()),
                })
            }
        }
    }

    /// Close the underlying channel. Later publishes fail with a transport error.
    pub async fn close(&self) -> Result<(), QueueError> {
        let _guard = self.inner.lock.lock().await;
        self.inner.channel.close().await
    }
}
