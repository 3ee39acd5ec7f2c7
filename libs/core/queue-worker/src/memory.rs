//! In-process broker.
//!
//! Implements the same contract the AMQP backend gets from RabbitMQ, so
//! the connection manager, publisher and consumer loop can run without a
//! broker process:
//!
//! - queues are shared by every connection made through one `MemoryBroker`
//! - deliveries stay unacked until acked, nacked or their channel closes
//! - nack with requeue (and channel close) puts the message back at the head
//!   of the queue with `redelivered = true`
//! - publishing to an undeclared queue drops the message, like the default
//!   exchange does with unroutable messages
//! - availability and queue declaration can be made to fail on demand

use crate::broker::{Broker, BrokerChannel, DeliveryStream, QueueOptions};
use crate::error::QueueError;
use crate::event::Delivery;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::debug;

/// Counters describing everything the broker has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub published: u64,
    pub delivered: u64,
    pub acked: u64,
    pub nacked: u64,
    pub requeued: u64,
    pub dropped: u64,
}

/// Cloneable handle to one in-process broker.
#[derive(Clone)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

struct Shared {
    available: AtomicBool,
    fail_declare: AtomicBool,
    connect_attempts: AtomicU32,
    state: Mutex<State>,
    notify: Notify,
}

#[derive(Default)]
struct State {
    queues: HashMap<String, MemoryQueue>,
    open_channels: HashSet<u64>,
    unacked: HashMap<u64, Unacked>,
    next_delivery_tag: u64,
    next_channel_id: u64,
    stats: MemoryStats,
}

struct MemoryQueue {
    options: QueueOptions,
    ready: VecDeque<StoredMessage>,
}

struct StoredMessage {
    payload: Vec<u8>,
    redelivered: bool,
}

struct Unacked {
    channel_id: u64,
    queue: String,
    message: StoredMessage,
}

impl State {
    fn is_open(&self, channel_id: u64) -> bool {
        self.open_channels.contains(&channel_id)
    }

    fn deliver(&mut self, queue: &str, channel_id: u64) -> Option<Delivery> {
        let message = self.queues.get_mut(queue)?.ready.pop_front()?;

        self.next_delivery_tag += 1;
        let tag = self.next_delivery_tag;
        let delivery = Delivery::new(tag, message.payload.clone(), message.redelivered);

        self.unacked.insert(
            tag,
            Unacked {
                channel_id,
                queue: queue.to_string(),
                message,
            },
        );
        self.stats.delivered += 1;
        Some(delivery)
    }

    fn requeue(&mut self, unacked: Unacked) {
        let Unacked { queue, message, .. } = unacked;
        if let Some(q) = self.queues.get_mut(&queue) {
            q.ready.push_front(StoredMessage {
                payload: message.payload,
                redelivered: true,
            });
            self.stats.requeued += 1;
        } else {
            self.stats.dropped += 1;
        }
    }

    fn take_unacked(&mut self, channel_id: u64, tag: u64) -> Result<Unacked, QueueError> {
        if !self.is_open(channel_id) {
            return Err(QueueError::transport("channel is closed"));
        }
        match self.unacked.get(&tag) {
            Some(entry) if entry.channel_id == channel_id => {}
            _ => {
                return Err(QueueError::transport(format!(
                    "PRECONDITION_FAILED - unknown delivery tag {tag}"
                )));
            }
        }
        self.unacked
            .remove(&tag)
            .ok_or_else(|| QueueError::Internal(format!("delivery tag {tag} vanished")))
    }

    fn close_channel(&mut self, channel_id: u64) {
        if !self.open_channels.remove(&channel_id) {
            return;
        }

        let mut tags: Vec<u64> = self
            .unacked
            .iter()
            .filter(|(_, entry)| entry.channel_id == channel_id)
            .map(|(tag, _)| *tag)
            .collect();
        // newest first so push_front leaves the oldest at the head
        tags.sort_unstable_by(|a, b| b.cmp(a));

        for tag in tags {
            if let Some(entry) = self.unacked.remove(&tag) {
                self.requeue(entry);
            }
        }
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                available: AtomicBool::new(true),
                fail_declare: AtomicBool::new(false),
                connect_attempts: AtomicU32::new(0),
                state: Mutex::new(State::default()),
                notify: Notify::new(),
            }),
        }
    }

    /// Make connection attempts fail (`false`) or succeed (`true`).
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    /// Make every queue declaration fail.
    pub fn fail_queue_declare(&self, fail: bool) {
        self.shared.fail_declare.store(fail, Ordering::SeqCst);
    }

    /// Connection attempts so far, successful or not.
    pub fn connect_attempts(&self) -> u32 {
        self.shared.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> MemoryStats {
        self.shared.lock().stats
    }

    pub fn has_queue(&self, queue: &str) -> bool {
        self.shared.lock().queues.contains_key(queue)
    }

    /// Messages waiting to be delivered.
    pub fn ready_len(&self, queue: &str) -> usize {
        self.shared
            .lock()
            .queues
            .get(queue)
            .map(|q| q.ready.len())
            .unwrap_or(0)
    }

    /// Deliveries handed out but not yet settled.
    pub fn unacked_len(&self) -> usize {
        self.shared.lock().unacked.len()
    }

    pub fn open_channels(&self) -> usize {
        self.shared.lock().open_channels.len()
    }

    /// Close every open channel, as if the broker connection dropped.
    pub fn drop_connections(&self) {
        {
            let mut state = self.shared.lock();
            let channels: Vec<u64> = state.open_channels.iter().copied().collect();
            for channel_id in channels {
                state.close_channel(channel_id);
            }
        }
        self.shared.notify.notify_waiters();
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn BrokerChannel>, QueueError> {
        self.shared.connect_attempts.fetch_add(1, Ordering::SeqCst);

        if !self.shared.available.load(Ordering::SeqCst) {
            return Err(QueueError::Connection(format!(
                "broker at {uri} is unreachable"
            )));
        }

        let id = {
            let mut state = self.shared.lock();
            state.next_channel_id += 1;
            let id = state.next_channel_id;
            state.open_channels.insert(id);
            id
        };

        debug!(channel_id = id, "Opened in-memory channel");
        Ok(Arc::new(MemoryChannel {
            id,
            shared: self.shared.clone(),
        }))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryChannel {
    id: u64,
    shared: Arc<Shared>,
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn declare_queue(&self, queue: &str, options: QueueOptions) -> Result<(), QueueError> {
        if self.shared.fail_declare.load(Ordering::SeqCst) {
            return Err(QueueError::transport(format!(
                "ACCESS_REFUSED - declare of queue '{queue}' denied"
            )));
        }

        let mut state = self.shared.lock();
        if !state.is_open(self.id) {
            return Err(QueueError::transport("channel is closed"));
        }

        match state.queues.get(queue) {
            Some(existing) if existing.options != options => Err(QueueError::transport(format!(
                "PRECONDITION_FAILED - inequivalent arguments for queue '{queue}'"
            ))),
            Some(_) => Ok(()),
            None => {
                state.queues.insert(
                    queue.to_string(),
                    MemoryQueue {
                        options,
                        ready: VecDeque::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), QueueError> {
        {
            let mut state = self.shared.lock();
            if !state.is_open(self.id) {
                return Err(QueueError::transport("channel is closed"));
            }

            state.stats.published += 1;
            match state.queues.get_mut(queue) {
                Some(q) => q.ready.push_back(StoredMessage {
                    payload: payload.to_vec(),
                    redelivered: false,
                }),
                None => state.stats.dropped += 1,
            }
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn subscribe(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<Box<dyn DeliveryStream>, QueueError> {
        let state = self.shared.lock();
        if !state.is_open(self.id) {
            return Err(QueueError::transport("channel is closed"));
        }
        if !state.queues.contains_key(queue) {
            return Err(QueueError::transport(format!(
                "NOT_FOUND - no queue '{queue}'"
            )));
        }

        debug!(channel_id = self.id, consumer_tag, queue, "Subscribed");
        Ok(Box::new(MemoryDeliveryStream {
            channel_id: self.id,
            queue: queue.to_string(),
            shared: self.shared.clone(),
        }))
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), QueueError> {
        let mut state = self.shared.lock();
        state.take_unacked(self.id, delivery_tag)?;
        state.stats.acked += 1;
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), QueueError> {
        {
            let mut state = self.shared.lock();
            let entry = state.take_unacked(self.id, delivery_tag)?;
            state.stats.nacked += 1;
            if requeue {
                state.requeue(entry);
            } else {
                state.stats.dropped += 1;
            }
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.shared.lock().close_channel(self.id);
        self.shared.notify.notify_waiters();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.shared.lock().is_open(self.id)
    }
}

struct MemoryDeliveryStream {
    channel_id: u64,
    queue: String,
    shared: Arc<Shared>,
}

#[async_trait]
impl DeliveryStream for MemoryDeliveryStream {
    async fn next(&mut self) -> Option<Result<Delivery, QueueError>> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // register before checking so a publish in between is not missed
            notified.as_mut().enable();

            {
                let mut state = self.shared.lock();
                if !state.is_open(self.channel_id) {
                    return None;
                }
                if let Some(delivery) = state.deliver(&self.queue, self.channel_id) {
                    return Some(Ok(delivery));
                }
            }

            notified.await;
        }
    }
}
