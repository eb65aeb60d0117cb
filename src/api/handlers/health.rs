use crate::{types::HealthResponse, AppState};
use axum::{extract::State, Json};

/// Liveness plus a summary of the vector store.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.retrieval.status().await;

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        activated: status.activated,
        embedding_model: status.embedding_model,
        store_state: status.state,
        entry_count: status.entry_count,
    })
}
