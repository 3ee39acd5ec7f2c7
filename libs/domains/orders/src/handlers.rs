use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use std::sync::Arc;

use crate::error::OrderResult;
use crate::models::{SubmitAck, SubmitOrder};
use crate::submit::OrderSubmitter;

/// Create the order router
///
/// - `POST /api/benchmark/rabbitmq` - publish the fixed benchmark order
/// - `POST /api/orders` - publish an order described by the request body
pub fn router(submitter: OrderSubmitter) -> Router {
    Router::new()
        .route("/api/benchmark/rabbitmq", post(submit_benchmark))
        .route("/api/orders", post(submit_order))
        .with_state(Arc::new(submitter))
}

async fn submit_benchmark(
    State(submitter): State<Arc<OrderSubmitter>>,
) -> OrderResult<(StatusCode, Json<SubmitAck>)> {
    let ack = submitter.submit_benchmark().await?;
    Ok((StatusCode::ACCEPTED, Json(ack)))
}

async fn submit_order(
    State(submitter): State<Arc<OrderSubmitter>>,
    Json(input): Json<SubmitOrder>,
) -> OrderResult<(StatusCode, Json<SubmitAck>)> {
    let ack = submitter.submit_order(input).await?;
    Ok((StatusCode::ACCEPTED, Json(ack)))
}
