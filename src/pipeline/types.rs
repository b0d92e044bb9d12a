//! Shared types for the dialogue pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Conversation ────────────────────────────────────────────────────

/// Opaque conversation identifier: creation time plus a random suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Fresh identifier for a conversation created at `at`.
    ///
    /// Runs started in the same millisecond still get distinct ids.
    pub fn from_time(at: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("conv-{}-{}", at.timestamp_millis(), &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Fragment ────────────────────────────────────────────────────────

/// One decoded unit of generated dialogue. Both fields are non-blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub author: String,
    pub text: String,
}

impl Fragment {
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
        }
    }
}

// ── Sentiment ───────────────────────────────────────────────────────

/// Sentiment label attached to a message by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }

    /// Derive a label from free-form model output.
    ///
    /// Ordered substring tests on the lower-cased text: "positive" wins over
    /// "negative"; anything else, including empty output, is neutral.
    pub fn from_model_output(output: &str) -> Self {
        let normalized = output.to_lowercase();
        if normalized.contains("positive") {
            Sentiment::Positive
        } else if normalized.contains("negative") {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(Sentiment::Positive),
            "negative" => Ok(Sentiment::Negative),
            "neutral" => Ok(Sentiment::Neutral),
            other => Err(format!("unknown sentiment: '{other}'")),
        }
    }
}

// ── Message ─────────────────────────────────────────────────────────

/// A persisted dialogue message, keyed by `(conversation_id, order)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub conversation_id: ConversationId,
    pub order: u32,
    pub author: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classified_at: Option<DateTime<Utc>>,
    /// Set once the envelope has been sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enqueued_at: Option<DateTime<Utc>>,
}

impl Message {
    /// A freshly parsed, not yet classified message.
    pub fn new(conversation_id: ConversationId, order: u32, fragment: Fragment) -> Self {
        Self {
            conversation_id,
            order,
            author: fragment.author,
            text: fragment.text,
            sentiment: None,
            created_at: Utc::now(),
            classified_at: None,
            enqueued_at: None,
        }
    }

    pub fn envelope(&self) -> QueueEnvelope {
        QueueEnvelope {
            conversation_id: self.conversation_id.clone(),
            order: self.order,
            author: self.author.clone(),
            text: self.text.clone(),
        }
    }
}

// ── Queue envelope ──────────────────────────────────────────────────

/// Queue-carried copy of a message's identifying fields.
///
/// Wire format: `{"conversationId", "order", "author", "text"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEnvelope {
    pub conversation_id: ConversationId,
    pub order: u32,
    pub author: String,
    pub text: String,
}

impl QueueEnvelope {
    pub fn to_body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_body(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }
}

// ── Write summary ───────────────────────────────────────────────────

/// Outcome of writing one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub conversation_id: ConversationId,
    /// Messages persisted.
    pub persisted: usize,
    /// Envelopes successfully sent.
    pub enqueued: usize,
    /// Orders persisted without an envelope (enqueue failed).
    pub orphaned: Vec<u32>,
}
