use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use queue_worker::QueueError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

pub type OrderResult<T> = Result<T, OrderError>;

/// Error body returned by the order endpoints
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable error identifier
    pub error: &'static str,
    /// Human-readable error message
    pub message: String,
}

impl OrderError {
    pub fn status(&self) -> StatusCode {
        match self {
            OrderError::Validation(_) => StatusCode::BAD_REQUEST,
            OrderError::Queue(QueueError::Transport(_) | QueueError::Connection(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            OrderError::Queue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for OrderError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match status {
            StatusCode::BAD_REQUEST => "BadRequest",
            StatusCode::SERVICE_UNAVAILABLE => "ServiceUnavailable",
            _ => "InternalServerError",
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Order submission failed");
        } else {
            tracing::info!(error = %self, "Order rejected");
        }

        (
            status,
            Json(ErrorResponse {
                error,
                message: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            OrderError::Validation("empty".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            OrderError::from(QueueError::transport("channel is closed")).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            OrderError::from(QueueError::Serialization("bad".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
