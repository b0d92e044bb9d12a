//! Classifier worker: single-consumer loop over the sentiment queue.
//!
//! Per delivery:
//! 1. `receive()`; nothing visible → idle
//! 2. too many receives → dead-letter
//! 3. body is not an envelope → dead-letter
//! 4. `SentimentClassifier::handle()`; success → ack, failure → leave it
//!
//! An unacknowledged delivery reappears after the queue's visibility
//! timeout. That is the only retry mechanism.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::QueueError;
use crate::pipeline::SentimentClassifier;
use crate::pipeline::types::{QueueEnvelope, Sentiment};
use crate::queue::MessageQueue;

/// What one `process_one` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// Queue had nothing visible.
    Idle,
    /// Envelope classified, stored, and acknowledged.
    Classified(Sentiment),
    /// Handling failed; the delivery was left for redelivery.
    Retrying,
    /// Delivery parked and never retried.
    DeadLettered,
}

pub struct ClassifierWorker {
    queue: Arc<dyn MessageQueue>,
    classifier: Arc<SentimentClassifier>,
    max_receive_count: u32,
}

impl ClassifierWorker {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        classifier: Arc<SentimentClassifier>,
        max_receive_count: u32,
    ) -> Self {
        Self {
            queue,
            classifier,
            max_receive_count,
        }
    }

    /// Receive and handle at most one envelope.
    pub async fn process_one(&self) -> Result<WorkerOutcome, QueueError> {
        let Some(delivery) = self.queue.receive().await? else {
            return Ok(WorkerOutcome::Idle);
        };

        if delivery.receive_count > self.max_receive_count {
            warn!(
                receive_count = delivery.receive_count,
                max = self.max_receive_count,
                "Envelope exceeded receive limit"
            );
            self.queue
                .dead_letter(&delivery.receipt, "max receive count exceeded")
                .await?;
            return Ok(WorkerOutcome::DeadLettered);
        }

        let envelope = match QueueEnvelope::from_body(&delivery.body) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Undecodable envelope");
                self.queue
                    .dead_letter(&delivery.receipt, &format!("undecodable body: {e}"))
                    .await?;
                return Ok(WorkerOutcome::DeadLettered);
            }
        };

        match self.classifier.handle(&envelope).await {
            Ok(sentiment) => {
                if !self.queue.ack(&delivery.receipt).await? {
                    // Visibility timeout elapsed mid-handling; the redelivery
                    // will rewrite the same key.
                    warn!(
                        conversation_id = %envelope.conversation_id,
                        order = envelope.order,
                        "Ack after visibility timeout, envelope will be redelivered"
                    );
                }
                Ok(WorkerOutcome::Classified(sentiment))
            }
            Err(e) => {
                warn!(
                    conversation_id = %envelope.conversation_id,
                    order = envelope.order,
                    receive_count = delivery.receive_count,
                    error = %e,
                    "Classification failed, leaving envelope for redelivery"
                );
                Ok(WorkerOutcome::Retrying)
            }
        }
    }
}

/// Spawn the worker loop. Sleeps `poll_interval` whenever the queue is idle
/// or unreachable.
///
/// Returns a `JoinHandle` and shutdown flag.
pub fn spawn_classifier_worker(
    worker: Arc<ClassifierWorker>,
    poll_interval: Duration,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            poll_ms = poll_interval.as_millis() as u64,
            "Classifier worker started"
        );

        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Classifier worker shutting down");
                return;
            }

            match worker.process_one().await {
                Ok(WorkerOutcome::Idle) => tokio::time::sleep(poll_interval).await,
                Ok(outcome) => debug!(?outcome, "Delivery processed"),
                Err(e) => {
                    error!(error = %e, "Queue unavailable");
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    });

    (handle, shutdown_flag)
}
