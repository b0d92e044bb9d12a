//! HTTP trigger and read-back endpoints.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::pipeline::GenerationJob;
use crate::pipeline::types::ConversationId;
use crate::store::MessageStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub job: Arc<GenerationJob>,
    pub store: Arc<dyn MessageStore>,
}

/// Build the Axum router with the generation trigger and read routes.
pub fn pipeline_routes(job: Arc<GenerationJob>, store: Arc<dyn MessageStore>) -> Router {
    let state = AppState { job, store };

    Router::new()
        .route("/health", get(health))
        .route("/generate", post(generate))
        .route("/api/conversations/{id}", get(get_conversation))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "dialogue-pipeline"
    }))
}

// ── Generation ──────────────────────────────────────────────────────────

async fn generate(State(state): State<AppState>) -> impl IntoResponse {
    match state.job.run_once().await {
        Ok(summary) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "message": format!(
                    "Conversation generated with {} messages",
                    summary.persisted
                ),
                "conversationId": summary.conversation_id,
                "enqueued": summary.enqueued,
            })),
        ),
        Err(e) => {
            error!(error = %e, "Generation request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "An error occurred while generating the conversation"
                })),
            )
        }
    }
}

// ── Conversations ───────────────────────────────────────────────────────

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let conversation_id = ConversationId::from(id);
    match state.store.list_conversation(&conversation_id).await {
        Ok(messages) => (StatusCode::OK, Json(serde_json::json!(messages))),
        Err(e) => {
            error!(conversation_id = %conversation_id, error = %e, "Conversation lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to load conversation"})),
            )
        }
    }
}
