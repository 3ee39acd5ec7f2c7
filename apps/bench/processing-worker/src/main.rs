//! Processing Worker - Entry Point
//!
//! Background worker that consumes orders from the RabbitMQ queue.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    bench_processing_worker::run().await
}
