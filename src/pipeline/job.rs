//! One generation run: generate, parse, write.
//!
//! Shared by the HTTP trigger and the cron ticker.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::pipeline::generator::DialogueGenerator;
use crate::pipeline::parser;
use crate::pipeline::types::{ConversationId, WriteSummary};
use crate::pipeline::writer::ConversationWriter;

pub struct GenerationJob {
    generator: DialogueGenerator,
    writer: ConversationWriter,
}

impl GenerationJob {
    pub fn new(generator: DialogueGenerator, writer: ConversationWriter) -> Self {
        Self { generator, writer }
    }

    /// Generate one conversation under a fresh id.
    ///
    /// A response with no decodable fragments is a successful, empty run.
    pub async fn run_once(&self) -> Result<WriteSummary, PipelineError> {
        let conversation_id = ConversationId::from_time(Utc::now());
        info!(conversation_id = %conversation_id, "Generation run started");

        let raw = self.generator.generate().await?;
        let fragments = parser::parse(&raw);
        if fragments.is_empty() {
            warn!(conversation_id = %conversation_id, "No usable fragments in generated dialogue");
        }

        self.writer.write(&conversation_id, fragments).await
    }
}
