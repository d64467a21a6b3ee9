pub mod memory;
pub mod message;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub use message::{CheckConfig, CheckMessage, CheckPayload, MonitorData, MESSAGE_TYPE_MONITOR_CHECK};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue unreachable: {0}")]
    Unreachable(String),
    #[error("Message serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One received message plus the bookkeeping needed to acknowledge it.
/// `receive_count` includes this delivery, so a first-time delivery carries 1.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub receipt: Uuid,
    pub receive_count: u32,
    pub message: CheckMessage,
}

/// Capability interface over a durable at-least-once queue with visibility
/// timeouts. Any queue technology with these semantics can back the engine;
/// `memory::InMemoryCheckQueue` is the in-process implementation.
#[async_trait]
pub trait CheckQueue: Send + Sync {
    async fn enqueue(&self, message: &CheckMessage) -> Result<(), QueueError>;

    /// Pulls up to `max_messages`, making them invisible to other consumers
    /// for `visibility`. Unacknowledged messages reappear after that window
    /// with an incremented `receive_count`.
    async fn receive(
        &self,
        max_messages: usize,
        visibility: Duration,
    ) -> Result<Vec<Delivery>, QueueError>;

    /// Removes a processed message. Acknowledging after the visibility
    /// window has lapsed is a no-op; the message is already back in flight.
    async fn acknowledge(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Routes a poison message to the dead-letter destination with a reason.
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError>;

    /// Number of immediately receivable messages. Doubles as the
    /// reachability probe for health checks.
    async fn depth(&self) -> Result<usize, QueueError>;
}
