//! Dialogue generator: one completion call with a fixed scripted prompt.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

/// Sampling temperature for generation.
pub const TEMPERATURE: f32 = 1.0;

/// Nucleus-sampling cutoff for generation.
pub const TOP_P: f32 = 1.0;

/// Token budget for one generated dialogue.
pub const MAX_TOKENS: u32 = 1000;

/// Scripted three-persona scenario plus the output format the parser expects.
const DIALOGUE_PROMPT: &str = r#"Write a short chat conversation between three members of a software team.

Ana is the team lead. She is direct and worried about the release date.
Leo is a backend developer. He is calm and tends to propose quick fixes.
Mia is a QA engineer. She is sceptical and points out what could still break.

The build broke shortly before a release. Over 6 to 10 messages they discuss what happened, disagree a little, and agree on a plan.

Output format, strictly:
- Each message is a JSON object with exactly two string fields: {"person": "<name>", "text": "<message>"}
- Separate consecutive messages with a single # character.
- Never use the # character inside a message.
- Output nothing else: no introduction, no numbering, no code fences.

Example: {"person": "Ana", "text": "Who touched the build?"}#{"person": "Leo", "text": "Looking at it now."}"#;

/// Produces raw dialogue text for the parser.
pub struct DialogueGenerator {
    llm: Arc<dyn LlmProvider>,
}

impl DialogueGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// The request sent on every invocation: a single user turn.
    pub fn request() -> CompletionRequest {
        CompletionRequest::new(vec![ChatMessage::user(DIALOGUE_PROMPT)])
            .with_temperature(TEMPERATURE)
            .with_top_p(TOP_P)
            .with_max_tokens(MAX_TOKENS)
    }

    /// Call the completion API once and return the raw response.
    ///
    /// Failures propagate unchanged; nothing has been written at this point.
    pub async fn generate(&self) -> Result<String, LlmError> {
        debug!(model = self.llm.model_name(), "Requesting dialogue");
        let response = self.llm.complete(Self::request()).await?;
        info!(
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            finish_reason = ?response.finish_reason,
            "Dialogue generated"
        );
        Ok(response.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::Role;
    use crate::pipeline::testing::ScriptedLlm;

    #[test]
    fn request_is_single_user_turn_with_fixed_options() {
        let request = DialogueGenerator::request();
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, Role::User);
        assert!(request.messages[0].content.contains("Ana"));
        assert!(request.messages[0].content.contains("Leo"));
        assert!(request.messages[0].content.contains("Mia"));
        assert!(request.messages[0].content.contains(r#""person""#));
        assert_eq!(request.temperature, Some(1.0));
        assert_eq!(request.top_p, Some(1.0));
        assert_eq!(request.max_tokens, Some(1000));
    }

    #[tokio::test]
    async fn generate_returns_raw_text() {
        let llm = Arc::new(ScriptedLlm::new([r#"{"person":"Ana","text":"hi"}"#]));
        let generator = DialogueGenerator::new(llm.clone());

        let raw = generator.generate().await.unwrap();
        assert_eq!(raw, r#"{"person":"Ana","text":"hi"}"#);
        assert_eq!(llm.requests().len(), 1);
    }

    #[tokio::test]
    async fn generate_propagates_failure() {
        let generator = DialogueGenerator::new(Arc::new(ScriptedLlm::failing()));
        let err = generator.generate().await.unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed { .. }));
    }
}
