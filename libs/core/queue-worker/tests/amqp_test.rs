//! Integration tests against a real RabbitMQ broker
//!
//! Require Docker: `cargo test -p queue-worker --test amqp_test -- --ignored`

use async_trait::async_trait;
use queue_worker::{
    AmqpBroker, CancellationToken, ConnectionManager, ConsumerLoop, ConsumerState, Publisher,
    QueueError, QueueJob, QueueProcessor, WorkerConfig,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use test_utils::{TestDataBuilder, TestRabbitMq};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Note {
    id: String,
}

impl QueueJob for Note {
    fn job_id(&self) -> String {
        self.id.clone()
    }
}

/// Fails the first attempt of every job, then succeeds.
#[derive(Default)]
struct FlakyOnce {
    attempts: AtomicU32,
    done: Mutex<Vec<String>>,
}

#[async_trait]
impl QueueProcessor<Note> for FlakyOnce {
    async fn process(&self, job: &Note) -> Result<(), QueueError> {
        if self.attempts.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(QueueError::processing("first attempt fails"));
        }
        self.done.lock().unwrap().push(job.id.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "FlakyOnce"
    }
}

#[tokio::test]
#[ignore]
async fn test_roundtrip_with_requeue_through_rabbitmq() {
    let rabbit = TestRabbitMq::new().await;
    let data = TestDataBuilder::from_test_name("amqp_roundtrip");
    let config = WorkerConfig::new(data.name("queue", "roundtrip"))
        .with_broker_uri(rabbit.uri())
        .with_retry_interval_ms(500);
    let broker = Arc::new(AmqpBroker::new().with_prefetch_count(8));

    let manager = ConnectionManager::new(broker.clone(), &config);
    let cancel = CancellationToken::new();
    let publisher = Publisher::connect(&manager, &cancel).await.unwrap();

    let processor = Arc::new(FlakyOnce::default());
    let consumer = ConsumerLoop::with_arc_processor(broker, processor.clone(), config);
    let mut state = consumer.state();
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { consumer.run(cancel).await }
    });
    state
        .wait_for(|s| *s == ConsumerState::Subscribed)
        .await
        .unwrap();

    let id = data.order_id(1);
    publisher.publish(&Note { id: id.clone() }).await.unwrap();

    tokio::time::timeout(Duration::from_secs(20), async {
        while processor.done.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("message was not redelivered and acked");

    cancel.cancel();
    handle.await.unwrap().unwrap();
    publisher.close().await.unwrap();

    assert_eq!(processor.done.lock().unwrap().clone(), vec![id]);
    assert_eq!(processor.attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
#[ignore]
async fn test_unreachable_broker_is_retried_until_cancelled() {
    // nothing listens on this port
    let config = WorkerConfig::new("unreachable")
        .with_broker_uri("amqp://127.0.0.1:1/%2f")
        .with_retry_interval_ms(100);
    let manager = ConnectionManager::new(Arc::new(AmqpBroker::new()), &config);
    let cancel = CancellationToken::new();

    let task = tokio::spawn({
        let cancel = cancel.clone();
        async move { manager.connect(&cancel).await.map(|_| ()) }
    });
    tokio::time::sleep(Duration::from_millis(350)).await;
    cancel.cancel();

    let result = task.await.unwrap();
    assert!(matches!(result, Err(QueueError::Cancelled)));
}
