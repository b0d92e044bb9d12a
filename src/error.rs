//! Error types for the dialogue pipeline.

use std::time::Duration;

/// Configuration-related errors.
///
/// Missing values are never an error here: the store table, queue and API
/// credential default to empty strings and fail at call time instead.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Store table identifier is not configured")]
    NotConfigured,

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Queue-related errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Queue identifier is not configured")]
    NotConfigured,

    #[error("Queue storage error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Envelope serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Pipeline-level failures, surfaced at the trigger boundary.
///
/// Per-fragment parse failures never reach this type; see
/// [`crate::pipeline::parser::FragmentError`].
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] DatabaseError),

    #[error("Enqueue failed: {0}")]
    Enqueue(#[from] QueueError),
}
