//! Sentiment classifier: labels one queued message and stores the label.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{LlmError, PipelineError};
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::generator::{MAX_TOKENS, TEMPERATURE, TOP_P};
use crate::pipeline::types::{QueueEnvelope, Sentiment};
use crate::store::MessageStore;

/// Classifies envelopes and writes the result back to the store.
pub struct SentimentClassifier {
    llm: Arc<dyn LlmProvider>,
    store: Arc<dyn MessageStore>,
}

impl SentimentClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>, store: Arc<dyn MessageStore>) -> Self {
        Self { llm, store }
    }

    /// Ask the model for a label and map its free-form answer onto one.
    pub async fn classify(&self, text: &str) -> Result<Sentiment, LlmError> {
        let request = CompletionRequest::new(vec![ChatMessage::user(build_prompt(text))])
            .with_temperature(TEMPERATURE)
            .with_top_p(TOP_P)
            .with_max_tokens(MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        let sentiment = Sentiment::from_model_output(&response.content);
        debug!(output = %response.content, sentiment = %sentiment, "Model classified text");
        Ok(sentiment)
    }

    /// Classify one envelope and attach the label to its message.
    ///
    /// Safe to repeat: the store update is keyed by
    /// `(conversation_id, order)` and overwrites the previous label.
    pub async fn handle(&self, envelope: &QueueEnvelope) -> Result<Sentiment, PipelineError> {
        let sentiment = self.classify(&envelope.text).await?;
        self.store.set_sentiment(envelope, sentiment).await?;
        info!(
            conversation_id = %envelope.conversation_id,
            order = envelope.order,
            sentiment = %sentiment,
            "Message classified"
        );
        Ok(sentiment)
    }
}

fn build_prompt(text: &str) -> String {
    format!(
        "What is the sentiment of this text: \"{text}\"?\n\
         Reply with exactly one word: \"positive\", \"negative\", or \"neutral\"."
    )
}
