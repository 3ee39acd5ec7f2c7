//! RabbitMQ test infrastructure
//!
//! Provides a `TestRabbitMq` helper that starts a throwaway broker container.

use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::rabbitmq::RabbitMq;

/// Test RabbitMQ wrapper that ensures proper cleanup
///
/// The container is automatically stopped and removed when this struct is dropped.
///
/// # Example
///
/// ```no_run
/// use test_utils::TestRabbitMq;
///
/// # async fn example() {
/// let rabbit = TestRabbitMq::new().await;
/// let uri = rabbit.uri();
/// // connect a broker client to `uri`
/// # }
/// ```
pub struct TestRabbitMq {
    #[allow(dead_code)]
    container: ContainerAsync<RabbitMq>,
    host_port: u16,
    pub connection_string: String,
}

impl TestRabbitMq {
    /// Start a RabbitMQ container and wait until it accepts connections.
    pub async fn new() -> Self {
        let container = RabbitMq::default()
            .start()
            .await
            .expect("Failed to start RabbitMQ container");

        let host_port = container
            .get_host_port_ipv4(5672)
            .await
            .expect("Failed to get RabbitMQ port");

        let connection_string = format!("amqp://127.0.0.1:{}/%2f", host_port);

        tracing::info!(port = host_port, "Test RabbitMQ ready");

        Self {
            container,
            host_port,
            connection_string,
        }
    }

    /// AMQP URI for the default vhost
    pub fn uri(&self) -> &str {
        &self.connection_string
    }

    pub fn host_port(&self) -> u16 {
        self.host_port
    }
}

// Container is automatically cleaned up when TestRabbitMq is dropped
impl Drop for TestRabbitMq {
    fn drop(&mut self) {
        tracing::debug!("Cleaning up test RabbitMQ container");
    }
}
