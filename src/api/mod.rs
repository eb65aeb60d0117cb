//! HTTP API Handlers and Routes
//!
//! This module provides the HTTP layer for tianqi, built on the Axum web framework.
//!
//! # Module Structure
//!
//! - [`api::handlers`](crate::api::handlers) - Request handlers for each endpoint
//! - [`api::routes`](crate::api::routes) - Route definitions and router configuration
//!
//! # API Endpoints
//!
//! ## RAG (`/rag`)
//! - `POST /rag/chat` - Stream an answer grounded in the vector store
//! - `POST /rag/add_texts` - Embed and store texts
//! - `POST /rag/delete_by_index` - Remove one entry
//! - `POST /rag/delete_all` - Clear the store
//! - `POST /rag/update_text` - Replace an entry's text (it gets a new index)
//! - `POST /rag/change_embedding_model` - Swap the model and re-embed
//!
//! ## Casual (`/casual`)
//! - `POST /casual/chat` - Stream a reply without retrieval
//!
//! ## Health
//! - `GET /health` - Liveness and store summary
//!
//! # Streaming
//!
//! Chat routes answer with `text/event-stream`, one event per line:
//! ```text
//! event: context data: <retrieved text>
//! event: token data: <fragment>
//! event: done
//! ```

/// Request handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;
