//! Benchmark Gateway - Entry Point
//!
//! HTTP front door that submits orders to the processing worker over RabbitMQ.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    bench_gateway::run().await
}
