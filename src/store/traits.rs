//! `MessageStore` trait: the durable keyed store the pipeline writes to.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::pipeline::types::{ConversationId, Message, QueueEnvelope, Sentiment};

/// Backend-agnostic store for dialogue messages keyed by
/// `(conversation_id, order)`.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a newly parsed message. Fails if the key already exists.
    async fn insert_message(&self, message: &Message) -> Result<(), DatabaseError>;

    /// Attach a sentiment to the message an envelope refers to.
    ///
    /// Idempotent: re-applying overwrites the label. If the record is
    /// missing it is created from the envelope, so redelivery never yields
    /// more than one row per key.
    async fn set_sentiment(
        &self,
        envelope: &QueueEnvelope,
        sentiment: Sentiment,
    ) -> Result<(), DatabaseError>;

    /// Look up one message.
    async fn get_message(
        &self,
        conversation_id: &ConversationId,
        order: u32,
    ) -> Result<Option<Message>, DatabaseError>;

    /// All messages of a conversation, ordered by `order`.
    async fn list_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, DatabaseError>;

    /// Record that the message's envelope was handed to the queue.
    ///
    /// Idempotent; marking a missing key is not an error.
    async fn mark_enqueued(
        &self,
        conversation_id: &ConversationId,
        order: u32,
    ) -> Result<(), DatabaseError>;

    /// Orphaned messages: no sentiment and never enqueued, created before
    /// `created_before`, oldest first, up to `limit`.
    ///
    /// Messages whose envelope is waiting, in flight, or dead-lettered are
    /// never returned.
    async fn list_orphaned(
        &self,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Message>, DatabaseError>;
}
