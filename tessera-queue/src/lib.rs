//! Queue transport port for the reservation worker.
//!
//! The worker treats its queue as a black box supporting long-poll batch
//! receives, per-message deletion by receipt handle, and visibility-timeout
//! redelivery. [`EventQueue`] is the port; [`HttpQueue`] speaks to a managed
//! queue service over HTTP and [`InMemoryQueue`] backs tests and local runs.

pub mod http;
pub mod memory;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use tessera_core::ReceiptHandle;

pub use http::HttpQueue;
pub use memory::InMemoryQueue;

/// Message attribute carrying a distributed-tracing correlation id.
pub const TRACE_ID_ATTRIBUTE: &str = "TraceId";

/// A single delivery from the queue.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub body: String,
    /// Valid for this delivery only; rotates on redelivery.
    pub receipt_handle: ReceiptHandle,
    /// Approximate number of times this message has been delivered.
    pub receive_count: u32,
    /// Transport-level message attributes set by the publisher.
    pub attributes: HashMap<String, String>,
}

impl ReceivedMessage {
    pub fn trace_id(&self) -> Option<&str> {
        self.attributes
            .get(TRACE_ID_ATTRIBUTE)
            .map(String::as_str)
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue transport error: {0}")]
    Transport(String),
    #[error("queue returned status {code}: {body}")]
    Status { code: u16, body: String },
    #[error("receipt handle is no longer valid")]
    ReceiptExpired,
}

/// Receive/delete surface of the queue. Receiving hides a message for the
/// visibility window; deleting with the delivery's receipt is the only
/// acknowledgement. An unacknowledged message becomes receivable again once
/// its window expires.
#[async_trait]
pub trait EventQueue: Send + Sync {
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
        visibility_timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    async fn delete(&self, receipt: &ReceiptHandle) -> Result<(), QueueError>;
}
