//! RabbitMQ backend (AMQP 0-9-1 via lapin)

use crate::broker::{Broker, BrokerChannel, DeliveryStream, QueueOptions};
use crate::error::QueueError;
use crate::event::Delivery;
use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Opens one AMQP connection plus one channel per `connect` call.
#[derive(Debug, Clone, Default)]
pub struct AmqpBroker {
    prefetch_count: u16,
}

impl AmqpBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap on unacked deliveries per channel. 0 leaves it unlimited.
    pub fn with_prefetch_count(mut self, prefetch_count: u16) -> Self {
        self.prefetch_count = prefetch_count;
        self
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn BrokerChannel>, QueueError> {
        let connection = Connection::connect(uri, ConnectionProperties::default())
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        let channel = or_cleanup(connection.create_channel(), close_quietly(&connection)).await?;

        if self.prefetch_count > 0 {
            or_cleanup(
                channel.basic_qos(self.prefetch_count, BasicQosOptions::default()),
                close_quietly(&connection),
            )
            .await?;
        }

        debug!(channel_id = channel.id(), "Opened AMQP channel");
        Ok(Arc::new(AmqpChannel {
            connection,
            channel,
        }))
    }

    fn name(&self) -> &'static str {
        "amqp"
    }
}

/// Await `setup`; when it fails, run `cleanup` before reporting the error.
async fn or_cleanup<T, E>(
    setup: impl Future<Output = Result<T, E>>,
    cleanup: impl Future<Output = ()>,
) -> Result<T, QueueError>
where
    E: fmt::Display,
{
    match setup.await {
        Ok(value) => Ok(value),
        Err(e) => {
            cleanup.await;
            Err(QueueError::Connection(e.to_string()))
        }
    }
}

/// Close a connection whose channel setup failed.
async fn close_quietly(connection: &Connection) {
    if connection.status().connected() {
        if let Err(e) = connection.close(200, "OK").await {
            debug!(error = %e, "Error closing half-open AMQP connection");
        }
    }
}

struct AmqpChannel {
    connection: Connection,
    channel: Channel,
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn declare_queue(&self, queue: &str, options: QueueOptions) -> Result<(), QueueError> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: options.durable,
                    exclusive: options.exclusive,
                    auto_delete: options.auto_delete,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), QueueError> {
        // default exchange, routing key = queue name; no publisher confirms
        self.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default(),
            )
            .await?;
        Ok(())
    }

    async fn subscribe(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<Box<dyn DeliveryStream>, QueueError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(Box::new(AmqpDeliveryStream { consumer }))
    }

    async fn ack(&self, delivery_tag: u64) -> Result<(), QueueError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions { multiple: false })
            .await?;
        Ok(())
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<(), QueueError> {
        self.channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    multiple: false,
                    requeue,
                },
            )
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        if self.channel.status().connected() {
            self.channel.close(200, "OK").await?;
        }
        if self.connection.status().connected() {
            self.connection.close(200, "OK").await?;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.channel.status().connected() && self.connection.status().connected()
    }
}

struct AmqpDeliveryStream {
    consumer: Consumer,
}

#[async_trait]
impl DeliveryStream for AmqpDeliveryStream {
    async fn next(&mut self) -> Option<Result<Delivery, QueueError>> {
        let item = self.consumer.next().await?;
        Some(
            item.map(|d| Delivery::new(d.delivery_tag, d.data, d.redelivered))
                .map_err(|e| QueueError::Connection(e.to_string())),
        )
    }
}
