//! Prometheus metrics for the queue transport
//!
//! Provides observability into publish throughput, delivery outcomes and
//! broker connectivity.

use crate::error::QueueError;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::info;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize Prometheus metrics
///
/// Call this once at startup. Subsequent calls return the same handle.
pub fn init_metrics() -> Result<&'static PrometheusHandle, QueueError> {
    PROMETHEUS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| QueueError::Config(format!("failed to install Prometheus recorder: {e}")))?;
        info!("Prometheus metrics initialized");
        Ok(handle)
    })
}

/// Get the Prometheus handle for rendering metrics
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Queue transport metrics helper, labelled by queue
#[derive(Debug, Clone)]
pub struct QueueMetrics {
    queue_name: String,
}

impl QueueMetrics {
    pub fn new(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: queue_name.into(),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Record a connection attempt and its outcome
    pub fn connect_attempt(&self, success: bool) {
        counter!(
            "queue_worker_connect_attempts_total",
            "queue" => self.queue_name.clone(),
            "status" => if success { "success" } else { "failed" }
        )
        .increment(1);
    }

    /// Record a publish and its outcome
    pub fn published(&self, success: bool, bytes: usize) {
        counter!(
            "queue_worker_published_total",
            "queue" => self.queue_name.clone(),
            "status" => if success { "success" } else { "failed" }
        )
        .increment(1);

        if success {
            histogram!(
                "queue_worker_published_bytes",
                "queue" => self.queue_name.clone()
            )
            .record(bytes as f64);
        }
    }

    /// Record a delivery being received
    pub fn job_received(&self, redelivered: bool) {
        counter!(
            "queue_worker_deliveries_total",
            "queue" => self.queue_name.clone(),
            "redelivered" => if redelivered { "true" } else { "false" }
        )
        .increment(1);
    }

    /// Record how long processing a delivery took, whatever the outcome
    pub fn job_processed(&self, duration: Duration) {
        histogram!(
            "queue_worker_processing_duration_seconds",
            "queue" => self.queue_name.clone()
        )
        .record(duration.as_secs_f64());
    }

    /// Record a failed processing attempt
    pub fn job_failed(&self, category: &str) {
        counter!(
            "queue_worker_processing_errors_total",
            "queue" => self.queue_name.clone(),
            "category" => category.to_string()
        )
        .increment(1);
    }

    /// Record a delivery the broker accepted an ack or nack for
    pub fn job_settled(&self, outcome: &'static str) {
        counter!(
            "queue_worker_settled_total",
            "queue" => self.queue_name.clone(),
            "outcome" => outcome
        )
        .increment(1);
    }

    /// Record an ack or nack the broker refused
    pub fn settle_failed(&self, outcome: &'static str) {
        counter!(
            "queue_worker_settle_failures_total",
            "queue" => self.queue_name.clone(),
            "outcome" => outcome
        )
        .increment(1);
    }

    /// Update the in-flight deliveries gauge
    pub fn in_flight(&self, count: usize) {
        gauge!(
            "queue_worker_in_flight",
            "queue" => self.queue_name.clone()
        )
        .set(count as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = QueueMetrics::new("orders-queue");
        assert_eq!(metrics.queue_name(), "orders-queue");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let metrics = QueueMetrics::new("orders-queue");
        metrics.connect_attempt(false);
        metrics.published(true, 2048);
        metrics.job_received(true);
        metrics.job_processed(Duration::from_millis(10));
        metrics.job_failed("transient");
        metrics.job_settled("nack");
        metrics.settle_failed("ack");
        metrics.in_flight(3);
    }
}
