//! Dialogue pipeline: generated conversations, persisted and classified.

pub mod config;
pub mod error;
pub mod http;
pub mod llm;
pub mod pipeline;
pub mod queue;
pub mod scheduler;
pub mod store;
pub mod worker;
