//! Dialogue pipeline.
//!
//! A generation run flows through:
//! 1. `DialogueGenerator::generate()`: one completion call, raw text
//! 2. `parser::parse()`: `#`-separated fragments, malformed ones dropped
//! 3. `ConversationWriter::write()`: persist each message, then enqueue it
//!
//! The classification side consumes the queue one envelope at a time through
//! `SentimentClassifier::handle()` (driven by `crate::worker`). `Reconciler`
//! re-enqueues messages whose send failed.

pub mod classifier;
pub mod generator;
pub mod job;
pub mod parser;
pub mod reconcile;
pub mod types;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use classifier::SentimentClassifier;
pub use generator::DialogueGenerator;
pub use job::GenerationJob;
pub use reconcile::{Reconciler, spawn_reconciler};
pub use writer::ConversationWriter;
