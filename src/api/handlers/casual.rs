use crate::{
    api::handlers::event_stream_response,
    llm::GenerationParams,
    types::{AppError, CasualChatRequest, Result},
    AppState,
};
use axum::{extract::State, response::Response, Json};
use tracing::info;
use uuid::Uuid;

/// Stream a reply to a single message, without retrieval.
///
/// The body is token events followed by `done`, or a single `error`.
pub async fn casual_chat(
    State(state): State<AppState>,
    Json(payload): Json<CasualChatRequest>,
) -> Result<Response> {
    if payload.content.trim().is_empty() {
        return Err(AppError::InvalidInput("Content required".into()));
    }

    let request_id = Uuid::new_v4();
    info!(%request_id, role = %payload.role, "Casual chat");

    let params = GenerationParams::from(&state.config_manager.config().generation);
    let events = state
        .orchestrator
        .casual(payload.content, payload.role, Some(params));
    Ok(event_stream_response(events))
}
