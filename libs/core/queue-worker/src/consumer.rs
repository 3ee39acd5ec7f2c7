//! Consumer loop
//!
//! Long-running task that keeps one subscription alive on the queue and
//! settles every delivery exactly once:
//!
//! ```text
//! Connecting ──connected──▶ Subscribed ◀──idle── Processing
//!     ▲   │                    │  ╲ delivery ──▶     │
//!     │   └──cancel──┐         │                     │
//!     └─stream ended─┼─────────┘                     │
//!                    ▼                               │
//!                Cancelled ◀───cancel (after drain)──┘
//! ```
//!
//! Successful processing acks the delivery; decode or processing failure
//! nacks it with requeue, so a message is redelivered until some consumer
//! processes it successfully.

use crate::broker::{Broker, BrokerChannel, DeliveryStream};
use crate::config::WorkerConfig;
use crate::connection::ConnectionManager;
use crate::error::QueueError;
use crate::event::Delivery;
use crate::metrics::QueueMetrics;
use crate::registry::{QueueJob, QueueProcessor};
use futures::FutureExt;
use std::any::Any;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Observable consumer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    /// Waiting for the broker; the initial state
    Connecting,
    /// Subscription active, nothing in flight
    Subscribed,
    /// At least one delivery is being processed
    Processing,
    /// Stopped after cancellation; terminal
    Cancelled,
}

impl ConsumerState {
    /// Whether the consumer is currently able to receive deliveries.
    pub fn is_serving(&self) -> bool {
        matches!(self, ConsumerState::Subscribed | ConsumerState::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumerState::Connecting => "connecting",
            ConsumerState::Subscribed => "subscribed",
            ConsumerState::Processing => "processing",
            ConsumerState::Cancelled => "cancelled",
        }
    }
}

/// How a subscription ended.
enum SessionEnd {
    Cancelled,
    Disconnected,
}

/// At-least-once consumer for one queue.
///
/// # Type Parameters
///
/// * `J` - The job type carried by each delivery
/// * `P` - The processor invoked per delivery
///
/// # Concurrency
///
/// Each delivery is processed in its own task; at most
/// `max_concurrent_jobs` run at once. Ordering across deliveries is not
/// preserved when that limit is above 1.
pub struct ConsumerLoop<J, P>
where
    J: QueueJob,
    P: QueueProcessor<J>,
{
    connection: ConnectionManager,
    processor: Arc<P>,
    config: WorkerConfig,
    semaphore: Arc<Semaphore>,
    state: watch::Sender<ConsumerState>,
    metrics: QueueMetrics,
    _phantom: PhantomData<J>,
}

impl<J, P> ConsumerLoop<J, P>
where
    J: QueueJob,
    P: QueueProcessor<J> + 'static,
{
    pub fn new(broker: Arc<dyn Broker>, processor: P, config: WorkerConfig) -> Self {
        Self::with_arc_processor(broker, Arc::new(processor), config)
    }

    /// Create a consumer loop sharing an existing processor.
    pub fn with_arc_processor(
        broker: Arc<dyn Broker>,
        processor: Arc<P>,
        config: WorkerConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConsumerState::Connecting);

        Self {
            connection: ConnectionManager::new(broker, &config),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1))),
            metrics: QueueMetrics::new(&config.queue_name),
            processor,
            config,
            state,
            _phantom: PhantomData,
        }
    }

    /// Subscribe to state transitions.
    pub fn state(&self) -> watch::Receiver<ConsumerState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConsumerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = previous.as_str(), to = state.as_str(), "Consumer state changed");
        }
    }

    /// Run until cancelled.
    ///
    /// Returns `Ok(())` on cancellation, whether it happened while waiting
    /// for the broker or while subscribed. A lost connection sends the loop
    /// back to `Connecting`.
    ///
    /// # Errors
    ///
    /// `QueueError::FatalSetup` when the queue cannot be declared or
    /// subscribed to.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), QueueError> {
        info!(
            queue = %self.config.queue_name,
            consumer_tag = %self.config.consumer_tag,
            processor = %self.processor.name(),
            max_concurrent_jobs = self.config.max_concurrent_jobs,
            "Starting consumer loop"
        );

        loop {
            self.set_state(ConsumerState::Connecting);

            let channel = match self.connection.connect(&cancel).await {
                Ok(channel) => channel,
                Err(e) if e.is_cancelled() => break,
                Err(e) => {
                    error!(error = %e, "Consumer setup failed");
                    return Err(e);
                }
            };

            let end = self.consume(channel.clone(), &cancel).await;

            if let Err(e) = channel.close().await {
                debug!(error = %e, "Error closing consumer channel");
            }

            match end? {
                SessionEnd::Cancelled => break,
                SessionEnd::Disconnected => {
                    warn!(queue = %self.config.queue_name, "Delivery stream ended, reconnecting");
                }
            }
        }

        self.set_state(ConsumerState::Cancelled);
        info!(queue = %self.config.queue_name, "Consumer loop stopped");
        Ok(())
    }

    async fn consume(
        &self,
        channel: Arc<dyn BrokerChannel>,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd, QueueError> {
        let mut deliveries: Box<dyn DeliveryStream> = channel
            .subscribe(&self.config.queue_name, &self.config.consumer_tag)
            .await
            .map_err(|e| QueueError::FatalSetup(format!("failed to subscribe: {e}")))?;

        self.set_state(ConsumerState::Subscribed);
        info!(queue = %self.config.queue_name, "Waiting for messages");

        let mut tasks: JoinSet<()> = JoinSet::new();

        let end = loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break SessionEnd::Cancelled,

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    self.task_finished(joined, &tasks);
                }

                next = deliveries.next(), if self.semaphore.available_permits() > 0 => {
                    let delivery = match next {
                        Some(Ok(delivery)) => delivery,
                        Some(Err(e)) => {
                            warn!(error = %e, "Delivery stream failed");
                            break SessionEnd::Disconnected;
                        }
                        None => break SessionEnd::Disconnected,
                    };

                    // only this loop acquires permits, so one is free here
                    let permit = self
                        .semaphore
                        .clone()
                        .try_acquire_owned()
                        .map_err(|e| QueueError::Internal(e.to_string()))?;

                    let channel = channel.clone();
                    let processor = self.processor.clone();
                    let metrics = self.metrics.clone();
                    tasks.spawn(async move {
                        handle_delivery::<J, P>(channel.as_ref(), processor.as_ref(), &metrics, delivery).await;
                        drop(permit);
                    });

                    self.set_state(ConsumerState::Processing);
                    self.metrics.in_flight(tasks.len());
                }
            }
        };

        // in-flight deliveries are settled before the channel is released
        if !tasks.is_empty() {
            info!(in_flight = tasks.len(), "Waiting for in-flight deliveries");
        }
        while let Some(joined) = tasks.join_next().await {
            self.task_finished(joined, &tasks);
        }

        Ok(end)
    }

    fn task_finished(&self, joined: Result<(), JoinError>, tasks: &JoinSet<()>) {
        if let Err(e) = joined {
            error!(error = %e, "Delivery task failed");
        }
        self.metrics.in_flight(tasks.len());
        if tasks.is_empty() && *self.state.borrow() == ConsumerState::Processing {
            self.set_state(ConsumerState::Subscribed);
        }
    }
}

/// Decode, process and settle one delivery. Never fails: every outcome is
/// turned into an ack or a nack.
async fn handle_delivery<J, P>(
    channel: &dyn BrokerChannel,
    processor: &P,
    metrics: &QueueMetrics,
    delivery: Delivery,
) where
    J: QueueJob,
    P: QueueProcessor<J>,
{
    let tag = delivery.delivery_tag;
    let redelivered = delivery.redelivered;
    let received_at = delivery.received_at;
    metrics.job_received(redelivered);

    let started = Instant::now();
    let (job_id, outcome) = match delivery.decode::<J>() {
        Ok(job) => {
            let job_id = job.job_id();
            let outcome = AssertUnwindSafe(processor.process(&job))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(QueueError::processing(panic_message(panic))));
            (job_id, outcome)
        }
        Err(e) => ("unknown".to_string(), Err(e)),
    };

    metrics.job_processed(started.elapsed());

    match outcome {
        Ok(()) => match channel.ack(tag).await {
            Ok(()) => {
                metrics.job_settled("ack");
                debug!(delivery_tag = tag, job_id = %job_id, "Job acked");
            }
            Err(e) => {
                metrics.settle_failed("ack");
                error!(delivery_tag = tag, job_id = %job_id, error = %e, "Failed to ack delivery");
            }
        },
        Err(e) => {
            metrics.job_failed(e.category().as_str());
            error!(
                delivery_tag = tag,
                job_id = %job_id,
                redelivered,
                %received_at,
                processor = processor.name(),
                error = %e,
                "Processing failed, requeueing"
            );
            match channel.nack(tag, true).await {
                Ok(()) => metrics.job_settled("nack"),
                Err(nack_err) => {
                    metrics.settle_failed("nack");
                    error!(delivery_tag = tag, job_id = %job_id, error = %nack_err, "Failed to nack delivery");
                }
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("processor panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("processor panicked: {s}")
    } else {
        "processor panicked".to_string()
    }
}
