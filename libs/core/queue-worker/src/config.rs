//! Worker configuration
//!
//! This module provides `WorkerConfig` for configuring the connection
//! manager, publisher and consumer loop.

use crate::broker::QueueOptions;
use crate::registry::QueueDef;
use std::time::Duration;
use uuid::Uuid;

/// Configuration for the queue transport
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Broker URI (e.g. "amqp://localhost:5672/%2f")
    pub broker_uri: String,

    /// Queue name shared by producer and consumer
    pub queue_name: String,

    /// Declaration arguments for the queue
    pub queue_options: QueueOptions,

    /// Consumer tag (auto-generated if not provided)
    pub consumer_tag: String,

    /// Fixed delay between connection attempts in milliseconds
    pub retry_interval_ms: u64,

    /// Maximum deliveries processed at once by one consumer
    pub max_concurrent_jobs: usize,
}

impl WorkerConfig {
    /// Create a new WorkerConfig from a QueueDef
    pub fn from_queue_def<Q: QueueDef>() -> Self {
        Self {
            queue_options: Q::queue_options(),
            ..Self::new(Q::QUEUE_NAME)
        }
    }

    /// Create a new WorkerConfig with explicit values
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            broker_uri: "amqp://localhost:5672/%2f".to_string(),
            queue_name: queue_name.into(),
            queue_options: QueueOptions::default(),
            consumer_tag: format!("worker-{}", Uuid::new_v4()),
            retry_interval_ms: 3000,
            max_concurrent_jobs: 1,
        }
    }

    /// Set the broker URI
    pub fn with_broker_uri(mut self, uri: impl Into<String>) -> Self {
        self.broker_uri = uri.into();
        self
    }

    /// Set the consumer tag
    pub fn with_consumer_tag(mut self, tag: impl Into<String>) -> Self {
        self.consumer_tag = tag.into();
        self
    }

    /// Set the connection retry interval
    pub fn with_retry_interval_ms(mut self, interval: u64) -> Self {
        self.retry_interval_ms = interval;
        self
    }

    /// Set the maximum concurrent jobs
    pub fn with_max_concurrent_jobs(mut self, count: usize) -> Self {
        self.max_concurrent_jobs = count.max(1);
        self
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::new("jobs")
    }
}
