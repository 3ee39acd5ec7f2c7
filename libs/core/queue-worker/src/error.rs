//! Queue error types and error categorization
//!
//! Errors are categorized to determine what happens next:
//! - **Transient**: the broker or the work may succeed later (reconnect, requeue)
//! - **Permanent**: retrying the same input cannot help

use thiserror::Error;

/// Category of error for determining retry behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Temporary failure - reconnect or requeue
    Transient,
    /// Unrecoverable for this input
    Permanent,
}

impl ErrorCategory {
    /// Label used on metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transient => "transient",
            ErrorCategory::Permanent => "permanent",
        }
    }
}

/// Queue transport errors
#[derive(Error, Debug)]
pub enum QueueError {
    /// Broker unreachable; absorbed by the connection manager's retry loop
    #[error("Connection error: {0}")]
    Connection(String),

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Domain processing failed for a delivered message
    #[error("Processing error: {0}")]
    Processing(String),

    /// Queue declaration or subscription failed after connecting; never retried
    #[error("Setup error: {0}")]
    FatalSetup(String),

    /// Channel unusable for publish/ack/nack (e.g. connection dropped)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Cancellation token fired
    #[error("Cancelled")]
    Cancelled,
}

impl QueueError {
    /// Create a processing error
    pub fn processing(message: impl Into<String>) -> Self {
        QueueError::Processing(message.into())
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        QueueError::Transport(message.into())
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            QueueError::Connection(_) => ErrorCategory::Transient,
            QueueError::Transport(_) => ErrorCategory::Transient,
            QueueError::Processing(_) => ErrorCategory::Transient,
            QueueError::Serialization(_) => ErrorCategory::Permanent,
            QueueError::FatalSetup(_) => ErrorCategory::Permanent,
            QueueError::Config(_) => ErrorCategory::Permanent,
            QueueError::Internal(_) => ErrorCategory::Permanent,
            QueueError::Cancelled => ErrorCategory::Permanent,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueueError::Cancelled)
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Serialization(err.to_string())
    }
}

impl From<lapin::Error> for QueueError {
    fn from(err: lapin::Error) -> Self {
        QueueError::Transport(err.to_string())
    }
}
