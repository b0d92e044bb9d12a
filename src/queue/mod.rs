//! Message queue between the writer and the sentiment classifier.
//!
//! At-least-once semantics: a received message stays hidden for the
//! visibility timeout and becomes visible again unless it is acknowledged.
//! Consumers must be idempotent.

pub mod libsql_queue;

pub use libsql_queue::LibSqlQueue;

use async_trait::async_trait;

use crate::error::QueueError;

/// One receive of a queued message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Handle for `ack`/`dead_letter`; a new one is issued per receive.
    pub receipt: String,
    /// Raw message body (JSON envelope).
    pub body: String,
    /// Number of receives so far, including this one.
    pub receive_count: u32,
}

/// Queue service as seen by the pipeline.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Append a message.
    async fn send(&self, body: &str) -> Result<(), QueueError>;

    /// Take the next visible message, hiding it for the visibility timeout.
    async fn receive(&self) -> Result<Option<Delivery>, QueueError>;

    /// Delete a received message. Returns `false` for a stale receipt.
    async fn ack(&self, receipt: &str) -> Result<bool, QueueError>;

    /// Park a received message so it is never delivered again.
    async fn dead_letter(&self, receipt: &str, reason: &str) -> Result<bool, QueueError>;
}
