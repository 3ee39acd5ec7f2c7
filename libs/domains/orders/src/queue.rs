//! Queue definition for the orders domain.

use queue_worker::QueueDef;

/// The single queue shared by the gateway (producer) and the processing
/// worker (consumer). Both sides declare it on connect.
pub struct OrderQueue;

impl QueueDef for OrderQueue {
    const QUEUE_NAME: &'static str = "orders-queue";
}
