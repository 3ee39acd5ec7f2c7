//! Environment-driven settings for order submission and processing.

use core_config::{ConfigError, FromEnv, env_parse_or};
use std::time::Duration;

/// Largest synthetic payload accepted per order (8 MiB)
pub const MAX_PAYLOAD_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSettings {
    /// Default synthetic payload size in bytes
    pub payload_size: usize,
    /// Simulated work per order in milliseconds
    pub processing_delay_ms: u64,
}

impl OrderSettings {
    pub fn processing_delay(&self) -> Duration {
        Duration::from_millis(self.processing_delay_ms)
    }
}

impl Default for OrderSettings {
    fn default() -> Self {
        Self {
            payload_size: 1024,
            processing_delay_ms: 10,
        }
    }
}

impl FromEnv for OrderSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let payload_size = env_parse_or("ORDER_PAYLOAD_SIZE", defaults.payload_size)?;
        if payload_size > MAX_PAYLOAD_SIZE {
            return Err(ConfigError::ParseError {
                key: "ORDER_PAYLOAD_SIZE".to_string(),
                details: format!("{} exceeds the {} byte limit", payload_size, MAX_PAYLOAD_SIZE),
            });
        }

        Ok(Self {
            payload_size,
            processing_delay_ms: env_parse_or(
                "ORDER_PROCESSING_DELAY_MS",
                defaults.processing_delay_ms,
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        temp_env::with_vars_unset(["ORDER_PAYLOAD_SIZE", "ORDER_PROCESSING_DELAY_MS"], || {
            let settings = OrderSettings::from_env().unwrap();
            assert_eq!(settings, OrderSettings::default());
            assert_eq!(settings.processing_delay(), Duration::from_millis(10));
        });
    }

    #[test]
    fn test_overrides() {
        temp_env::with_vars(
            [
                ("ORDER_PAYLOAD_SIZE", Some("2048")),
                ("ORDER_PROCESSING_DELAY_MS", Some("0")),
            ],
            || {
                let settings = OrderSettings::from_env().unwrap();
                assert_eq!(settings.payload_size, 2048);
                assert_eq!(settings.processing_delay_ms, 0);
            },
        );
    }

    #[test]
    fn test_oversized_payload_rejected() {
        temp_env::with_var("ORDER_PAYLOAD_SIZE", Some("999999999"), || {
            let err = OrderSettings::from_env().unwrap_err();
            assert!(err.to_string().contains("ORDER_PAYLOAD_SIZE"));
        });
    }
}
