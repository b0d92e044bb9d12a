//! Recovery job for messages that were persisted but never enqueued.
//!
//! Persist and enqueue are not atomic, so a failed send leaves a message
//! without a sentiment and without an envelope. The reconciler re-sends an
//! envelope for every such message older than a grace period and marks it
//! enqueued. Messages whose envelope is still queued, in flight, or
//! dead-lettered are never touched, so the worker's attempt threshold holds.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, QueueError};
use crate::queue::MessageQueue;
use crate::store::MessageStore;

/// Messages re-enqueued per pass.
pub const DEFAULT_BATCH_LIMIT: usize = 100;

pub struct Reconciler {
    store: Arc<dyn MessageStore>,
    queue: Arc<dyn MessageQueue>,
    grace: Duration,
    batch_limit: usize,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn MessageStore>,
        queue: Arc<dyn MessageQueue>,
        grace: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            grace,
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }

    pub fn with_batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit;
        self
    }

    /// Re-enqueue orphaned messages older than the grace period.
    ///
    /// Returns how many envelopes were sent.
    pub async fn reconcile_once(&self) -> Result<usize, PipelineError> {
        let grace = chrono::Duration::from_std(self.grace).unwrap_or(chrono::Duration::zero());
        let cutoff = Utc::now() - grace;
        let pending = self.store.list_orphaned(cutoff, self.batch_limit).await?;
        if pending.is_empty() {
            debug!("No orphaned messages to reconcile");
            return Ok(0);
        }

        let mut sent = 0;
        for message in &pending {
            let body = message.envelope().to_body().map_err(QueueError::from)?;
            self.queue.send(&body).await?;
            sent += 1;

            if let Err(e) = self
                .store
                .mark_enqueued(&message.conversation_id, message.order)
                .await
            {
                warn!(
                    conversation_id = %message.conversation_id,
                    order = message.order,
                    error = %e,
                    "Re-enqueued message not marked"
                );
            }
        }

        info!(count = sent, "Re-enqueued orphaned messages");
        Ok(sent)
    }
}

/// Spawn a background task that runs the reconciler every `interval`.
///
/// Returns a `JoinHandle` and shutdown flag.
pub fn spawn_reconciler(
    reconciler: Arc<Reconciler>,
    interval: Duration,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Reconciler started");

        let mut tick = tokio::time::interval(interval);
        // Skip immediate first tick
        tick.tick().await;

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Reconciler shutting down");
                return;
            }

            if let Err(e) = reconciler.reconcile_once().await {
                error!(error = %e, "Reconcile pass failed");
            }
        }
    });

    (handle, shutdown_flag)
}
