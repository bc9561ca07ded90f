//! Service-default endpoints: liveness, health and configuration status.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/alive", get(alive))
        .route("/agent/status", get(status))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn alive() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "alive" }))
}

async fn status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let backends = &state.backends;
    Json(serde_json::json!({
        "chatService": backends.chat_service,
        "chatModel": backends.chat_model,
        "embeddingService": backends.embedding_service,
        "embeddingModel": backends.embedding_model,
        "agents": state.group_chat.agent_names(),
        "maximumIterations": state.group_chat.maximum_iterations,
    }))
}
