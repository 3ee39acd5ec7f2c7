use crate::{env_or_default, env_parse_or, ConfigError, FromEnv};
use std::env;

/// RabbitMQ broker configuration
///
/// `RABBITMQ_URL` wins when set; otherwise the URI is assembled from
/// `RABBITMQ_HOST` (default "localhost") and `RABBITMQ_PORT` (default 5672).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RabbitMqConfig {
    pub host: String,
    pub port: u16,
    pub url: Option<String>,
    /// Fixed delay between connection attempts while the broker is unavailable
    pub retry_interval_ms: u64,
    /// Unacknowledged deliveries the broker may push to one consumer
    pub prefetch_count: u16,
}

impl RabbitMqConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// AMQP URI on the default vhost
    pub fn uri(&self) -> String {
        match &self.url {
            Some(url) => url.clone(),
            None => format!("amqp://{}:{}/%2f", self.host, self.port),
        }
    }
}

impl Default for RabbitMqConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            url: None,
            retry_interval_ms: 3000,
            prefetch_count: 32,
        }
    }
}

impl FromEnv for RabbitMqConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            host: env_or_default("RABBITMQ_HOST", &defaults.host),
            port: env_parse_or("RABBITMQ_PORT", defaults.port)?,
            url: env::var("RABBITMQ_URL").ok().filter(|url| !url.trim().is_empty()),
            retry_interval_ms: env_parse_or("RABBITMQ_RETRY_INTERVAL_MS", defaults.retry_interval_ms)?,
            prefetch_count: env_parse_or("RABBITMQ_PREFETCH", defaults.prefetch_count)?,
        })
    }
}
