//! Conversation writer: orders, persists, and enqueues parsed fragments.
//!
//! Each fragment is persisted before its envelope is sent, and the message is
//! marked enqueued once the send succeeds. The steps are not transactional: a
//! failed send leaves an unmarked message that only the reconciler picks up
//! again.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, QueueError};
use crate::pipeline::types::{ConversationId, Fragment, Message, WriteSummary};
use crate::queue::MessageQueue;
use crate::store::MessageStore;

/// Writes one conversation to the store and the classification queue.
pub struct ConversationWriter {
    store: Arc<dyn MessageStore>,
    queue: Arc<dyn MessageQueue>,
}

impl ConversationWriter {
    pub fn new(store: Arc<dyn MessageStore>, queue: Arc<dyn MessageQueue>) -> Self {
        Self { store, queue }
    }

    /// Persist and enqueue `fragments` in input order, with `order` counting
    /// from 0.
    ///
    /// A persistence failure aborts the invocation; messages written before
    /// it stay. A send failure is logged, recorded in
    /// [`WriteSummary::orphaned`], and writing continues.
    pub async fn write(
        &self,
        conversation_id: &ConversationId,
        fragments: Vec<Fragment>,
    ) -> Result<WriteSummary, PipelineError> {
        let mut summary = WriteSummary {
            conversation_id: conversation_id.clone(),
            persisted: 0,
            enqueued: 0,
            orphaned: Vec::new(),
        };

        for (order, fragment) in (0u32..).zip(fragments) {
            let message = Message::new(conversation_id.clone(), order, fragment);
            self.store.insert_message(&message).await?;
            summary.persisted += 1;

            match self.enqueue(&message).await {
                Ok(()) => {
                    summary.enqueued += 1;
                    debug!(conversation_id = %conversation_id, order, "Envelope sent");
                    // Unmarked messages are re-sent by the reconciler.
                    if let Err(e) = self.store.mark_enqueued(conversation_id, order).await {
                        warn!(
                            conversation_id = %conversation_id,
                            order,
                            error = %e,
                            "Envelope sent but not marked enqueued"
                        );
                    }
                }
                Err(e) => {
                    error!(
                        conversation_id = %conversation_id,
                        order,
                        error = %e,
                        "Message persisted but not enqueued"
                    );
                    summary.orphaned.push(order);
                }
            }
        }

        info!(
            conversation_id = %conversation_id,
            persisted = summary.persisted,
            enqueued = summary.enqueued,
            orphaned = summary.orphaned.len(),
            "Conversation written"
        );
        Ok(summary)
    }

    async fn enqueue(&self, message: &Message) -> Result<(), PipelineError> {
        let body = message.envelope().to_body().map_err(QueueError::from)?;
        self.queue.send(&body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{FlakyQueue, FlakyStore};
    use crate::pipeline::types::QueueEnvelope;

    fn fragments(authors: &[&str]) -> Vec<Fragment> {
        authors
            .iter()
            .map(|a| Fragment::new(*a, format!("message from {a}")))
            .collect()
    }

    #[tokio::test]
    async fn assigns_contiguous_orders_and_enqueues_each() {
        let store = Arc::new(FlakyStore::new().await);
        let queue = Arc::new(FlakyQueue::new().await);
        let writer = ConversationWriter::new(store.clone(), queue.clone());
        let conv = ConversationId::from("conv-1");

        let summary = writer
            .write(&conv, fragments(&["Ana", "Leo", "Mia"]))
            .await
            .unwrap();
        assert_eq!(summary.persisted, 3);
        assert_eq!(summary.enqueued, 3);
        assert!(summary.orphaned.is_empty());

        let stored = store.list_conversation(&conv).await.unwrap();
        let orders: Vec<u32> = stored.iter().map(|m| m.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert_eq!(stored[1].author, "Leo");
        assert!(stored.iter().all(|m| m.enqueued_at.is_some()));

        let envelopes: Vec<QueueEnvelope> = queue
            .drain()
            .await
            .iter()
            .map(|b| QueueEnvelope::from_body(b).unwrap())
            .collect();
        assert_eq!(envelopes.len(), 3);
        assert_eq!(envelopes[2].order, 2);
        assert_eq!(envelopes[2].author, "Mia");
        assert_eq!(envelopes[2].conversation_id, conv);
    }

    #[tokio::test]
    async fn empty_input_writes_nothing() {
        let store = Arc::new(FlakyStore::new().await);
        let queue = Arc::new(FlakyQueue::new().await);
        let writer = ConversationWriter::new(store.clone(), queue.clone());

        let summary = writer.write(&"conv-1".into(), Vec::new()).await.unwrap();
        assert_eq!(summary.persisted, 0);
        assert!(queue.drain().await.is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_stops_without_rollback() {
        let store = Arc::new(FlakyStore::new().await.fail_insert_at(1));
        let queue = Arc::new(FlakyQueue::new().await);
        let writer = ConversationWriter::new(store.clone(), queue.clone());
        let conv = ConversationId::from("conv-1");

        let err = writer
            .write(&conv, fragments(&["Ana", "Leo", "Mia"]))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Persistence(_)));

        // Fragment 0 stays persisted and enqueued; nothing after the failure.
        let stored = store.list_conversation(&conv).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].order, 0);
        assert_eq!(queue.drain().await.len(), 1);
    }

    #[tokio::test]
    async fn enqueue_failure_orphans_and_continues() {
        let store = Arc::new(FlakyStore::new().await);
        let queue = Arc::new(FlakyQueue::new().await.fail_sends([1]));
        let writer = ConversationWriter::new(store.clone(), queue.clone());
        let conv = ConversationId::from("conv-1");

        let summary = writer
            .write(&conv, fragments(&["Ana", "Leo", "Mia"]))
            .await
            .unwrap();
        assert_eq!(summary.persisted, 3);
        assert_eq!(summary.enqueued, 2);
        assert_eq!(summary.orphaned, vec![1]);

        let orphan = store.get_message(&conv, 1).await.unwrap().unwrap();
        assert!(orphan.sentiment.is_none());
        assert!(orphan.enqueued_at.is_none());
        let sent = store.get_message(&conv, 2).await.unwrap().unwrap();
        assert!(sent.enqueued_at.is_some());
        assert_eq!(queue.drain().await.len(), 2);
    }

    #[tokio::test]
    async fn mark_failure_still_counts_as_enqueued() {
        let store = Arc::new(FlakyStore::new().await.fail_enqueue_marks());
        let queue = Arc::new(FlakyQueue::new().await);
        let writer = ConversationWriter::new(store.clone(), queue.clone());

        let summary = writer
            .write(&"conv-1".into(), fragments(&["Ana", "Leo"]))
            .await
            .unwrap();
        assert_eq!(summary.persisted, 2);
        assert_eq!(summary.enqueued, 2);
        assert!(summary.orphaned.is_empty());
        assert_eq!(queue.drain().await.len(), 2);
    }
}
