//! LLM integration.
//!
//! The pipeline only needs one capability from the text-generation service:
//! given role/content turns and options, return the full response text.
//! That capability is the `LlmProvider` trait; `OpenAiProvider` is the
//! shipped implementation.

mod openai;
pub mod provider;

pub use openai::OpenAiProvider;
pub use provider::*;

use std::sync::Arc;
use std::time::Duration;

use crate::config::PipelineConfig;
use crate::error::LlmError;

/// Request timeout for completion calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub base_url: String,
}

impl From<&PipelineConfig> for LlmConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            api_key: config.openai_api_key.clone(),
            model: config.model.clone(),
            base_url: config.openai_base_url.clone(),
        }
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = OpenAiProvider::new(
        config.api_key.clone(),
        &config.model,
        &config.base_url,
        REQUEST_TIMEOUT,
    )?;
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_with_empty_key_still_constructs() {
        // An empty credential only fails once a request is made.
        let config = LlmConfig {
            api_key: secrecy::SecretString::from(""),
            model: "gpt-3.5-turbo".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        };
        let provider = create_provider(&config);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "gpt-3.5-turbo");
    }

    #[test]
    fn test_llm_config_from_pipeline_config() {
        let pipeline = PipelineConfig {
            model: "gpt-4o".to_string(),
            ..PipelineConfig::default()
        };
        let config = LlmConfig::from(&pipeline);
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.base_url, "https://api.openai.com/v1");
    }
}
