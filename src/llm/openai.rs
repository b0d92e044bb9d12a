//! OpenAI chat-completions provider over `reqwest`.
//!
//! Non-streaming only. No retries: a failed call is returned to the caller,
//! which relies on queue redelivery (classification) or fails the
//! invocation (generation).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
};

const PROVIDER: &str = "openai";

/// OpenAI-compatible chat-completions client.
pub struct OpenAiProvider {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(
        api_key: SecretString,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key,
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn to_wire_request<'a>(&'a self, request: &'a CompletionRequest) -> WireRequest<'a> {
        WireRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens,
            n: 1,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        // Unset credential; fail here instead of sending an unauthenticated request.
        if self.api_key.expose_secret().is_empty() {
            return Err(LlmError::AuthFailed {
                provider: PROVIDER.to_string(),
            });
        }

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.to_wire_request(&request))
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }

        let body: WireResponse = response.json().await.map_err(|e| LlmError::InvalidResponse {
            provider: PROVIDER.to_string(),
            reason: format!("Failed to decode body: {e}"),
        })?;

        let usage = body.usage.unwrap_or_default();
        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "No choices in response".to_string(),
            })?;

        debug!(
            model = %self.model,
            input_tokens = usage.prompt_tokens,
            output_tokens = usage.completion_tokens,
            "Completion received"
        );

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            finish_reason: finish_reason(choice.finish_reason.as_deref()),
            response_id: body.id,
        })
    }
}

fn status_error(status: StatusCode, body: String) -> LlmError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::AuthFailed {
            provider: PROVIDER.to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited {
            provider: PROVIDER.to_string(),
            retry_after: None,
        },
        _ => LlmError::RequestFailed {
            provider: PROVIDER.to_string(),
            reason: format!("HTTP {status}: {body}"),
        },
    }
}

fn finish_reason(raw: Option<&str>) -> FinishReason {
    match raw {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Unknown,
    }
}

// ── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    id: Option<String>,
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new(
            SecretString::from("sk-test"),
            "gpt-3.5-turbo",
            "https://api.openai.com/v1/",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        assert_eq!(
            provider().completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn wire_request_carries_fixed_options() {
        let provider = provider();
        let request = CompletionRequest::new(vec![ChatMessage::user("hi")])
            .with_temperature(1.0)
            .with_top_p(1.0)
            .with_max_tokens(1000);
        let json = serde_json::to_value(provider.to_wire_request(&request)).unwrap();
        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "hi");
        assert_eq!(json["max_tokens"], 1000);
        assert_eq!(json["n"], 1);
    }

    #[test]
    fn unset_options_are_omitted() {
        let provider = provider();
        let request = CompletionRequest::new(vec![ChatMessage::user("hi")]);
        let json = serde_json::to_value(provider.to_wire_request(&request)).unwrap();
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn decodes_wire_response() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [{"message": {"role": "assistant", "content": "positive"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 1, "total_tokens": 13}
        }"#;
        let parsed: WireResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("positive"));
        assert_eq!(finish_reason(parsed.choices[0].finish_reason.as_deref()), FinishReason::Stop);
        assert_eq!(parsed.usage.unwrap().prompt_tokens, 12);
    }

    #[tokio::test]
    async fn empty_key_fails_without_request() {
        let provider = OpenAiProvider::new(
            SecretString::from(""),
            "gpt-3.5-turbo",
            "http://127.0.0.1:9",
            Duration::from_secs(1),
        )
        .unwrap();
        let err = provider
            .complete(CompletionRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::AuthFailed { .. }));
    }

    #[test]
    fn unauthorized_maps_to_auth_failed() {
        let err = status_error(StatusCode::UNAUTHORIZED, String::new());
        assert!(matches!(err, LlmError::AuthFailed { .. }));
    }
}
