//! # tianqi - retrieval-augmented chat server and streaming client
//!
//! tianqi routes chat requests to a cloud or local LLM, optionally grounding
//! them in a personal document store. Answers stream back token by token over
//! a line-oriented event protocol.
//!
//! ## Overview
//!
//! tianqi can be used in two ways:
//!
//! 1. **As a standalone server** - Run `tianqi serve`
//! 2. **As a library** - Build an [`AppState`] and mount the router, or talk to
//!    a running server with [`protocol::RagClient`]
//!
//! ### Configuration-Driven Setup
//!
//! ```rust,ignore
//! use tianqi::{AppState, TianqiConfigManager};
//! use std::sync::Arc;
//!
//! let config_manager = Arc::new(TianqiConfigManager::new("tianqi.toml")?);
//! let state = AppState::from_config(config_manager).await?;
//! let app = tianqi::api::routes::build_app(state);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, app).await?;
//! ```
//!
//! ### Streaming Client
//!
//! ```rust,ignore
//! use tianqi::protocol::{RagClient, StreamEvent};
//! use std::time::Duration;
//!
//! let client = RagClient::new("http://127.0.0.1:3000", Duration::from_secs(300))?;
//! let mut events = client.chat("What did the report conclude?", Some(3));
//! while let Some(event) = events.recv().await {
//!     match event {
//!         StreamEvent::Context(text) => println!("[context]\n{text}"),
//!         StreamEvent::Token(token) => print!("{token}"),
//!         StreamEvent::Error(message) => eprintln!("error: {message}"),
//!         StreamEvent::Done => println!(),
//!     }
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ollama` | Ollama chat and embeddings (default) |
//! | `local-embeddings` | In-process fastembed embeddings |
//!
//! ## Modules
//!
//! - [`api`] - HTTP handlers and routes
//! - [`llm`] - LLM clients and the streaming generation backend
//! - [`protocol`] - Event codec and HTTP client
//! - [`rag`] - Ingestion, embeddings, vector store, retrieval, orchestration
//! - [`types`] - Request/response types and errors
//! - [`utils`] - Configuration and logging

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

/// HTTP API handlers and routes.
pub mod api;
/// Command-line interface.
pub mod cli;
/// LLM provider clients and the generation backend.
pub mod llm;
/// Streaming chat protocol: events, codec and client.
pub mod protocol;
/// Retrieval Augmented Generation (RAG) components.
pub mod rag;
/// Core types (requests, responses, errors).
pub mod types;
/// Configuration and logging utilities.
pub mod utils;

// Re-export commonly used types
pub use llm::{Fragment, GenerationBackend, GenerationParams, LLMClient, Provider};
pub use protocol::{RagClient, StreamEvent};
pub use rag::orchestrator::RagOrchestrator;
pub use rag::retrieval::RetrievalService;
pub use types::{AppError, Result};
pub use utils::toml_config::{TianqiConfig, TianqiConfigManager};

use crate::rag::embeddings::EmbeddingProvider;
use crate::rag::vector_store::{StoreOptions, VectorStore};
use std::sync::Arc;
use tracing::info;

/// Session state shared across handlers.
///
/// Built once by the entry point and passed explicitly; there are no globals.
#[derive(Clone)]
pub struct AppState {
    /// TOML configuration with hot-reload support
    pub config_manager: Arc<TianqiConfigManager>,
    /// Gated, persisted access to the vector store
    pub retrieval: Arc<RetrievalService>,
    /// Generation backend for the configured provider
    pub backend: Arc<GenerationBackend>,
    /// Retrieval plus generation as one event stream
    pub orchestrator: Arc<RagOrchestrator>,
}

impl AppState {
    pub fn new(
        config_manager: Arc<TianqiConfigManager>,
        retrieval: Arc<RetrievalService>,
        backend: Arc<GenerationBackend>,
    ) -> Self {
        let orchestrator = Arc::new(RagOrchestrator::new(
            Arc::clone(&retrieval),
            Arc::clone(&backend),
        ));
        Self {
            config_manager,
            retrieval,
            backend,
            orchestrator,
        }
    }

    /// Resolve providers from configuration and wire up the session.
    ///
    /// Retrieval is activated (loading any saved store) when
    /// `rag.activate_on_start` is set.
    pub async fn from_config(config_manager: Arc<TianqiConfigManager>) -> Result<Self> {
        let config = config_manager.config();

        let retrieval = Arc::new(build_retrieval(&config).await?);

        let provider = Provider::from_config(config.generation_provider()?)?;
        info!(
            provider = provider.name(),
            model = provider.model(),
            "Generation provider resolved"
        );
        let client = provider
            .create_client(&config.generation.system_prompt)
            .await?;
        let backend = Arc::new(GenerationBackend::new(
            Arc::from(client),
            GenerationParams::from(&config.generation),
            config.generation.channel_capacity,
        ));

        if config.rag.activate_on_start {
            retrieval.activate().await?;
        }

        Ok(Self::new(config_manager, retrieval, backend))
    }
}

/// Build an (inactive) retrieval service over the configured store location.
pub async fn build_retrieval(config: &TianqiConfig) -> Result<RetrievalService> {
    let provider = EmbeddingProvider::from_config(&config.rag.embedding);
    let embedder = provider.create_embedder().await?;
    let store = VectorStore::new(
        embedder,
        Arc::new(provider),
        StoreOptions::from(&config.rag),
    );
    Ok(RetrievalService::new(
        store,
        config.rag.vector_store_path.clone(),
    ))
}
