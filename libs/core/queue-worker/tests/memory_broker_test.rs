//! End-to-end tests for the queue transport against the in-memory broker
//!
//! These exercise the full producer → broker → consumer path:
//! - concurrent publishers sharing one channel
//! - ack on success, nack + requeue on failure (at-least-once)
//! - connection retry and cancellation
//! - draining in-flight work on shutdown

use async_trait::async_trait;
use queue_worker::{
    Broker, CancellationToken, ConnectionManager, ConsumerLoop, ConsumerState, MemoryBroker,
    Publisher, QueueDef, QueueError, QueueJob, QueueProcessor, WorkerConfig,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use test_utils::TestDataBuilder;
use test_utils::assertions::assert_same_items;
use tokio::task::JoinHandle;

struct BenchQueue;

impl QueueDef for BenchQueue {
    const QUEUE_NAME: &'static str = "bench-queue";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BenchJob {
    id: String,
    body: String,
}

impl QueueJob for BenchJob {
    fn job_id(&self) -> String {
        self.id.clone()
    }
}

/// Records every job it sees; fails jobs whose id is in `failing`.
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(String, String)>>,
    failing: Mutex<HashSet<String>>,
    attempts: AtomicU32,
    delay: Duration,
    started: AtomicBool,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl Recorder {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn fail(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    fn heal(&self, id: &str) {
        self.failing.lock().unwrap().remove(id);
    }

    fn seen_ids(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
    }
}

#[async_trait]
impl QueueProcessor<BenchJob> for Recorder {
    async fn process(&self, job: &BenchJob) -> Result<(), QueueError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.started.store(true, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(&job.id) {
            return Err(QueueError::processing(format!("refusing {}", job.id)));
        }
        self.seen
            .lock()
            .unwrap()
            .push((job.id.clone(), job.body.clone()));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Recorder"
    }
}

fn config() -> WorkerConfig {
    WorkerConfig::from_queue_def::<BenchQueue>()
        .with_broker_uri("memory://bench")
        .with_retry_interval_ms(3000)
        .with_max_concurrent_jobs(4)
}

async fn connect_publisher(broker: &MemoryBroker) -> Publisher {
    let manager = ConnectionManager::new(Arc::new(broker.clone()), &config());
    Publisher::connect(&manager, &CancellationToken::new())
        .await
        .unwrap()
}

fn spawn_consumer(
    broker: &MemoryBroker,
    processor: Arc<Recorder>,
    cancel: CancellationToken,
) -> (
    JoinHandle<Result<(), QueueError>>,
    tokio::sync::watch::Receiver<ConsumerState>,
) {
    let consumer = ConsumerLoop::with_arc_processor(Arc::new(broker.clone()), processor, config());
    let state = consumer.state();
    let handle = tokio::spawn(async move { consumer.run(cancel).await });
    (handle, state)
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publishers_deliver_every_message_once() {
    let broker = MemoryBroker::new();
    let publisher = connect_publisher(&broker).await;
    let data = TestDataBuilder::from_test_name("concurrent_publishers");

    let expected: Vec<String> = (0..64).map(|i| data.order_id(i)).collect();

    let mut handles = Vec::new();
    for id in expected.clone() {
        let publisher = publisher.clone();
        handles.push(tokio::spawn(async move {
            publisher
                .publish(&BenchJob {
                    body: format!("body-of-{id}"),
                    id,
                })
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let recorder = Arc::new(Recorder::default());
    let cancel = CancellationToken::new();
    let (handle, _) = spawn_consumer(&broker, recorder.clone(), cancel.clone());

    wait_until(|| broker.stats().acked == expected.len() as u64).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert_same_items(&recorder.seen_ids(), &expected, "delivered ids");
    for (id, body) in recorder.seen.lock().unwrap().iter() {
        assert_eq!(body, &format!("body-of-{id}"), "payload kept its tag");
    }
    assert_eq!(broker.stats().nacked, 0);
}

#[tokio::test]
async fn test_failed_processing_is_requeued_not_removed() {
    let broker = MemoryBroker::new();
    let publisher = connect_publisher(&broker).await;
    let recorder = Arc::new(Recorder::default());
    recorder.fail("poison");

    publisher
        .publish(&BenchJob {
            id: "poison".to_string(),
            body: "x".to_string(),
        })
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let (handle, _) = spawn_consumer(&broker, recorder.clone(), cancel.clone());

    wait_until(|| broker.stats().nacked >= 3).await;
    assert_eq!(broker.stats().acked, 0);
    assert!(broker.stats().requeued >= 3);

    // once processing recovers the same message is finally acked
    recorder.heal("poison");
    wait_until(|| broker.stats().acked == 1).await;

    cancel.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(recorder.seen_ids(), vec!["poison".to_string()]);
    assert_eq!(broker.ready_len(BenchQueue::QUEUE_NAME), 0);
}

#[tokio::test]
async fn test_acked_message_is_not_redelivered_after_restart() {
    let broker = MemoryBroker::new();
    let publisher = connect_publisher(&broker).await;
    publisher
        .publish(&BenchJob {
            id: "once".to_string(),
            body: "y".to_string(),
        })
        .await
        .unwrap();

    let first = Arc::new(Recorder::default());
    let cancel = CancellationToken::new();
    let (handle, _) = spawn_consumer(&broker, first.clone(), cancel.clone());
    wait_until(|| broker.stats().acked == 1).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    let second = Arc::new(Recorder::default());
    let cancel = CancellationToken::new();
    let (handle, mut state) = spawn_consumer(&broker, second.clone(), cancel.clone());
    state
        .wait_for(|s| *s == ConsumerState::Subscribed)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(first.seen_ids(), vec!["once".to_string()]);
    assert!(second.seen_ids().is_empty());
    assert_eq!(broker.stats().delivered, 1);
}

#[tokio::test(start_paused = true)]
async fn test_consumer_waits_for_broker_then_subscribes() {
    let broker = MemoryBroker::new();
    broker.set_available(false);

    let cancel = CancellationToken::new();
    let (handle, mut state) = spawn_consumer(&broker, Arc::new(Recorder::default()), cancel.clone());

    tokio::time::sleep(Duration::from_millis(6_500)).await;
    assert_eq!(broker.connect_attempts(), 3);
    assert_eq!(*state.borrow(), ConsumerState::Connecting);

    broker.set_available(true);
    state
        .wait_for(|s| *s == ConsumerState::Subscribed)
        .await
        .unwrap();
    assert_eq!(broker.connect_attempts(), 4);
    assert!(broker.has_queue(BenchQueue::QUEUE_NAME));

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_retry_returns_ok_within_one_interval() {
    let broker = MemoryBroker::new();
    broker.set_available(false);

    let cancel = CancellationToken::new();
    let (handle, state) = spawn_consumer(&broker, Arc::new(Recorder::default()), cancel.clone());

    tokio::time::sleep(Duration::from_millis(500)).await;
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_millis(3_000), handle)
        .await
        .expect("consumer did not stop within one retry interval")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(*state.borrow(), ConsumerState::Cancelled);
    assert_eq!(broker.open_channels(), 0);
}

#[tokio::test]
async fn test_undecodable_payload_is_nacked_and_loop_survives() {
    let broker = MemoryBroker::new();
    let publisher = connect_publisher(&broker).await;
    let recorder = Arc::new(Recorder::default());

    publisher.publish_bytes(b"not json at all").await.unwrap();
    publisher
        .publish(&BenchJob {
            id: "good".to_string(),
            body: "z".to_string(),
        })
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let (handle, _) = spawn_consumer(&broker, recorder.clone(), cancel.clone());

    wait_until(|| broker.stats().acked == 1 && broker.stats().nacked >= 2).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(recorder.seen_ids(), vec!["good".to_string()]);
    // the garbage is still on the queue, waiting for a consumer that can read it
    assert_eq!(broker.ready_len(BenchQueue::QUEUE_NAME), 1);
}

#[tokio::test]
async fn test_cancel_waits_for_in_flight_ack() {
    let broker = MemoryBroker::new();
    let publisher = connect_publisher(&broker).await;
    let recorder = Arc::new(Recorder::with_delay(Duration::from_millis(200)));

    publisher
        .publish(&BenchJob {
            id: "slow".to_string(),
            body: "s".to_string(),
        })
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let (handle, _) = spawn_consumer(&broker, recorder.clone(), cancel.clone());

    wait_until(|| recorder.started.load(Ordering::SeqCst)).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(broker.stats().acked, 1);
    assert_eq!(broker.unacked_len(), 0);
    assert_eq!(broker.ready_len(BenchQueue::QUEUE_NAME), 0);
}

#[tokio::test]
async fn test_consumer_reconnects_after_connection_drop() {
    let broker = MemoryBroker::new();
    let recorder = Arc::new(Recorder::default());
    let cancel = CancellationToken::new();
    let consumer = ConsumerLoop::with_arc_processor(
        Arc::new(broker.clone()),
        recorder.clone(),
        config().with_retry_interval_ms(20),
    );
    let mut state = consumer.state();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { consumer.run(cancel).await }
    });

    state
        .wait_for(|s| *s == ConsumerState::Subscribed)
        .await
        .unwrap();
    broker.drop_connections();

    wait_until(|| broker.connect_attempts() >= 2 && broker.open_channels() == 1).await;

    // a fresh publisher on its own connection reaches the new subscription
    let publisher = connect_publisher(&broker).await;
    publisher
        .publish(&BenchJob {
            id: "after-drop".to_string(),
            body: "r".to_string(),
        })
        .await
        .unwrap();
    wait_until(|| broker.stats().acked == 1).await;

    cancel.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(recorder.seen_ids(), vec!["after-drop".to_string()]);
}

#[tokio::test]
async fn test_fatal_setup_is_returned() {
    let broker = MemoryBroker::new();
    broker.fail_queue_declare(true);

    let consumer = ConsumerLoop::new(Arc::new(broker.clone()), Recorder::default(), config());
    let result = consumer.run(CancellationToken::new()).await;

    assert!(matches!(result, Err(QueueError::FatalSetup(_))));
    assert_eq!(broker.connect_attempts(), 1);
}

#[tokio::test]
async fn test_publisher_and_consumer_use_separate_channels() {
    let broker = MemoryBroker::new();
    let publisher = connect_publisher(&broker).await;
    let cancel = CancellationToken::new();
    let (handle, mut state) = spawn_consumer(&broker, Arc::new(Recorder::default()), cancel.clone());

    state
        .wait_for(|s| *s == ConsumerState::Subscribed)
        .await
        .unwrap();
    assert_eq!(broker.open_channels(), 2);

    cancel.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(broker.open_channels(), 1);

    publisher.close().await.unwrap();
    assert_eq!(broker.open_channels(), 0);
    assert_eq!(broker.name(), "memory");
}

/// Run `jobs` slow deliveries through a consumer limited to `limit` at once
/// and return the most that were ever processed together.
async fn peak_concurrency(limit: usize, jobs: usize) -> usize {
    let broker = MemoryBroker::new();
    let publisher = connect_publisher(&broker).await;
    for i in 0..jobs {
        publisher
            .publish(&BenchJob {
                id: format!("job-{i}"),
                body: "p".to_string(),
            })
            .await
            .unwrap();
    }

    let recorder = Arc::new(Recorder::with_delay(Duration::from_millis(20)));
    let cancel = CancellationToken::new();
    let consumer = ConsumerLoop::with_arc_processor(
        Arc::new(broker.clone()),
        recorder.clone(),
        config().with_max_concurrent_jobs(limit),
    );
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { consumer.run(cancel).await }
    });

    wait_until(|| broker.stats().acked == jobs as u64).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(recorder.seen_ids().len(), jobs);
    recorder.peak.load(Ordering::SeqCst)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_processing_never_exceeds_limit() {
    let peak = peak_concurrency(3, 12).await;

    assert!(peak <= 3, "peak concurrency {peak} exceeded the limit of 3");
    assert!(peak >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_job_limit_processes_one_at_a_time() {
    assert_eq!(peak_concurrency(1, 6).await, 1);
}
