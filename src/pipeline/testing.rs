//! Test doubles for the pipeline's collaborators.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{DatabaseError, LlmError, QueueError};
use crate::llm::provider::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
use crate::pipeline::types::{ConversationId, Message, QueueEnvelope, Sentiment};
use crate::queue::{Delivery, LibSqlQueue, MessageQueue};
use crate::store::{LibSqlBackend, MessageStore};

pub const TABLE: &str = "dialogue_messages";

/// LLM that replays scripted responses; the last one repeats.
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
    fail: bool,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fail: true,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        if self.fail {
            return Err(LlmError::RequestFailed {
                provider: "scripted".into(),
                reason: "scripted failure".into(),
            });
        }

        let mut responses = self.responses.lock().unwrap();
        let content = if responses.len() > 1 {
            responses.pop_front().unwrap_or_default()
        } else {
            responses.front().cloned().unwrap_or_default()
        };
        Ok(CompletionResponse {
            content,
            input_tokens: 10,
            output_tokens: 10,
            finish_reason: FinishReason::Stop,
            response_id: None,
        })
    }
}

/// In-memory store that can be told to fail specific calls.
pub struct FlakyStore {
    pub inner: LibSqlBackend,
    inserts: AtomicUsize,
    fail_insert_at: Option<usize>,
    sentiment_failures: AtomicUsize,
    fail_enqueue_marks: bool,
}

impl FlakyStore {
    pub async fn new() -> Self {
        Self {
            inner: LibSqlBackend::new_memory(TABLE).await.unwrap(),
            inserts: AtomicUsize::new(0),
            fail_insert_at: None,
            sentiment_failures: AtomicUsize::new(0),
            fail_enqueue_marks: false,
        }
    }

    /// Fail the `index`-th insert (zero-based).
    pub fn fail_insert_at(mut self, index: usize) -> Self {
        self.fail_insert_at = Some(index);
        self
    }

    /// Fail the next `count` sentiment updates.
    pub fn fail_sentiment_updates(self, count: usize) -> Self {
        self.sentiment_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Fail every `mark_enqueued` call.
    pub fn fail_enqueue_marks(mut self) -> Self {
        self.fail_enqueue_marks = true;
        self
    }
}

#[async_trait]
impl MessageStore for FlakyStore {
    async fn insert_message(&self, message: &Message) -> Result<(), DatabaseError> {
        let index = self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.fail_insert_at == Some(index) {
            return Err(DatabaseError::Query("injected insert failure".into()));
        }
        self.inner.insert_message(message).await
    }

    async fn set_sentiment(
        &self,
        envelope: &QueueEnvelope,
        sentiment: Sentiment,
    ) -> Result<(), DatabaseError> {
        let remaining = self.sentiment_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.sentiment_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DatabaseError::Query("injected update failure".into()));
        }
        self.inner.set_sentiment(envelope, sentiment).await
    }

    async fn get_message(
        &self,
        conversation_id: &ConversationId,
        order: u32,
    ) -> Result<Option<Message>, DatabaseError> {
        self.inner.get_message(conversation_id, order).await
    }

    async fn list_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Message>, DatabaseError> {
        self.inner.list_conversation(conversation_id).await
    }

    async fn mark_enqueued(
        &self,
        conversation_id: &ConversationId,
        order: u32,
    ) -> Result<(), DatabaseError> {
        if self.fail_enqueue_marks {
            return Err(DatabaseError::Query("injected mark failure".into()));
        }
        self.inner.mark_enqueued(conversation_id, order).await
    }

    async fn list_orphaned(
        &self,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Message>, DatabaseError> {
        self.inner.list_orphaned(created_before, limit).await
    }
}

/// In-memory queue whose sends can fail by index.
pub struct FlakyQueue {
    pub inner: LibSqlQueue,
    sends: AtomicUsize,
    fail_sends: HashSet<usize>,
}

impl FlakyQueue {
    pub async fn new() -> Self {
        Self::with_visibility(Duration::from_secs(30)).await
    }

    pub async fn with_visibility(visibility_timeout: Duration) -> Self {
        Self {
            inner: LibSqlQueue::new_memory("sentiment", visibility_timeout)
                .await
                .unwrap(),
            sends: AtomicUsize::new(0),
            fail_sends: HashSet::new(),
        }
    }

    /// Fail the sends with these zero-based indexes.
    pub fn fail_sends(mut self, indexes: impl IntoIterator<Item = usize>) -> Self {
        self.fail_sends = indexes.into_iter().collect();
        self
    }

    /// Drain every visible body, acknowledging as it goes.
    pub async fn drain(&self) -> Vec<String> {
        let mut bodies = Vec::new();
        while let Some(delivery) = self.inner.receive().await.unwrap() {
            self.inner.ack(&delivery.receipt).await.unwrap();
            bodies.push(delivery.body);
        }
        bodies
    }
}

#[async_trait]
impl MessageQueue for FlakyQueue {
    async fn send(&self, body: &str) -> Result<(), QueueError> {
        let index = self.sends.fetch_add(1, Ordering::SeqCst);
        if self.fail_sends.contains(&index) {
            return Err(DatabaseError::Query("injected send failure".into()).into());
        }
        self.inner.send(body).await
    }

    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        self.inner.receive().await
    }

    async fn ack(&self, receipt: &str) -> Result<bool, QueueError> {
        self.inner.ack(receipt).await
    }

    async fn dead_letter(&self, receipt: &str, reason: &str) -> Result<bool, QueueError> {
        self.inner.dead_letter(receipt, reason).await
    }
}
