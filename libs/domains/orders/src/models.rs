use queue_worker::QueueJob;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Customer used by the fixed benchmark order
pub const BENCHMARK_CUSTOMER_ID: &str = "customer-1";

/// Value of the fixed benchmark order
pub const BENCHMARK_ORDER_VALUE: Decimal = dec!(99.99);

/// Byte used to fill synthetic payloads
pub const PAYLOAD_FILL: char = 'A';

/// Order identifier, chosen by whoever creates the order
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Fresh random (UUID v4) id
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for OrderId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<Uuid> for OrderId {
    fn from(value: Uuid) -> Self {
        Self(value.to_string())
    }
}

/// The order handed from the gateway to the processing worker.
///
/// Write-once: there are no setters, and every delivery attempt decodes a
/// fresh copy from the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    id: OrderId,
    customer_id: String,
    value: Decimal,
    payload: String,
}

impl OrderRecord {
    /// New order with a generated id
    pub fn new(customer_id: impl Into<String>, value: Decimal, payload: impl Into<String>) -> Self {
        Self::with_id(OrderId::new(), customer_id, value, payload)
    }

    /// New order with a caller-chosen id
    pub fn with_id(
        id: impl Into<OrderId>,
        customer_id: impl Into<String>,
        value: Decimal,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            customer_id: customer_id.into(),
            value,
            payload: payload.into(),
        }
    }

    /// The fixed benchmark order: `customer-1`, `99.99`, `payload_size` bytes of `'A'`
    pub fn benchmark(payload_size: usize) -> Self {
        Self::new(
            BENCHMARK_CUSTOMER_ID,
            BENCHMARK_ORDER_VALUE,
            synthetic_payload(payload_size),
        )
    }

    pub fn id(&self) -> &OrderId {
        &self.id
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

impl QueueJob for OrderRecord {
    fn job_id(&self) -> String {
        self.id.to_string()
    }
}

/// `size` bytes of filler
pub fn synthetic_payload(size: usize) -> String {
    std::iter::repeat_n(PAYLOAD_FILL, size).collect()
}

/// Request body for submitting a custom order
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmitOrder {
    pub customer_id: String,
    pub value: Decimal,
    /// Falls back to the configured default size when absent
    #[serde(default)]
    pub payload_size: Option<usize>,
}

/// Immediate acknowledgement returned to the submitter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitAck {
    pub success: bool,
    pub message: String,
}

impl SubmitAck {
    pub fn published(id: &OrderId) -> Self {
        Self {
            success: true,
            message: format!("Order {} published to queue", id),
        }
    }
}
