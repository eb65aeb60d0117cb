//! RAG API handlers.
//!
//! Provides endpoints for:
//! - Retrieval-augmented chat, streamed as protocol events
//! - Retrieval-only search returning scored hits
//! - Vector store management (add, delete, clear, update, model swap)
//!
//! Every store mutation is persisted before the handler returns.

use crate::{
    api::handlers::event_stream_response,
    llm::GenerationParams,
    types::{
        AddTextsRequest, AppError, ChangeEmbeddingModelRequest, DeleteByIndexRequest,
        RagChatRequest, Result, SearchRequest, StatusResponse, UpdateTextRequest,
    },
    AppState,
};
use axum::{extract::State, response::Response, Json};
use tianqi_vector::SearchHit;
use tracing::info;
use uuid::Uuid;

// ============================================================================
// Chat Endpoint
// ============================================================================

/// Answer a query using the vector store as reference material.
///
/// The body is one `context` event, then tokens, then `done` or `error`.
pub async fn chat(
    State(state): State<AppState>,
    Json(payload): Json<RagChatRequest>,
) -> Result<Response> {
    if payload.query.trim().is_empty() {
        return Err(AppError::InvalidInput("Query required".into()));
    }
    if !state.retrieval.is_activated() {
        return Err(AppError::NotActivated);
    }

    // Read per request so reloaded settings apply to the next chat
    let config = state.config_manager.config();
    let k = payload.k.unwrap_or(config.rag.top_k_default);
    if k == 0 {
        return Err(AppError::InvalidInput("k must be greater than 0".into()));
    }

    let request_id = Uuid::new_v4();
    info!(%request_id, k, "RAG chat");

    let params = GenerationParams::from(&config.generation);
    let events = state.orchestrator.chat(payload.query, k, params);
    Ok(event_stream_response(events))
}

/// The `k` best matching entries with their scores. No generation happens.
pub async fn search(
    State(state): State<AppState>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<Vec<SearchHit>>> {
    if payload.query.trim().is_empty() {
        return Err(AppError::InvalidInput("Query required".into()));
    }

    let k = payload
        .k
        .unwrap_or_else(|| state.config_manager.config().rag.top_k_default);
    if k == 0 {
        return Err(AppError::InvalidInput("k must be greater than 0".into()));
    }

    let hits = state.retrieval.search(&payload.query, k).await?;
    info!(k, hits = hits.len(), "Search");
    Ok(Json(hits))
}

// ============================================================================
// Store Management Endpoints
// ============================================================================

pub async fn add_texts(
    State(state): State<AppState>,
    Json(payload): Json<AddTextsRequest>,
) -> Result<Json<StatusResponse>> {
    let texts: Vec<String> = payload
        .texts
        .into_iter()
        .filter(|t| !t.trim().is_empty())
        .collect();
    if texts.is_empty() {
        return Err(AppError::InvalidInput(
            "At least one non-empty text required".into(),
        ));
    }

    let assigned = state.retrieval.add_texts(texts).await?;
    info!(added = assigned.len(), "Texts added");
    Ok(Json(StatusResponse::success()))
}

pub async fn delete_by_index(
    State(state): State<AppState>,
    Json(payload): Json<DeleteByIndexRequest>,
) -> Result<Json<StatusResponse>> {
    state.retrieval.delete_by_index(payload.index).await?;
    info!(index = payload.index, "Entry deleted");
    Ok(Json(StatusResponse::success()))
}

pub async fn delete_all(State(state): State<AppState>) -> Result<Json<StatusResponse>> {
    state.retrieval.delete_all().await?;
    info!("Store cleared");
    Ok(Json(StatusResponse::success()))
}

pub async fn update_text(
    State(state): State<AppState>,
    Json(payload): Json<UpdateTextRequest>,
) -> Result<Json<StatusResponse>> {
    if payload.new_text.trim().is_empty() {
        return Err(AppError::InvalidInput("Text required".into()));
    }

    let new_index = state
        .retrieval
        .update_text(payload.index, payload.new_text)
        .await?;
    info!(old = payload.index, new = new_index, "Entry updated");
    Ok(Json(StatusResponse::success()))
}

/// Swap the embedding model, re-embedding every stored entry.
pub async fn change_embedding_model(
    State(state): State<AppState>,
    Json(payload): Json<ChangeEmbeddingModelRequest>,
) -> Result<Json<StatusResponse>> {
    let model = payload.new_model_name.trim();
    if model.is_empty() {
        return Err(AppError::InvalidInput("Model name required".into()));
    }

    state.retrieval.change_embedding_model(model).await?;
    Ok(Json(StatusResponse::success()))
}
