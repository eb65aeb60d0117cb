//! Mock implementations for testing.
//!
//! This module provides a mock LLM client, deterministic embedders and a
//! ready-made session that can be used across test files without
//! duplication. Nothing here touches the network.

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tianqi::llm::client::GenerationParams;
use tianqi::llm::{GenerationBackend, LLMClient};
use tianqi::rag::embeddings::{Embedder, EmbedderFactory};
use tianqi::rag::retrieval::RetrievalService;
use tianqi::rag::vector_store::{StoreOptions, VectorStore};
use tianqi::types::{AppError, Result};
use tianqi::utils::toml_config::TianqiConfig;
use tianqi::{AppState, TianqiConfigManager};

// ============= LLM =============

/// Mock LLM client with a canned reply.
///
/// Streams the reply word by word (spaces kept), so the concatenated tokens
/// always equal the full reply. Every prompt it receives is recorded.
///
/// # Examples
///
/// ```ignore
/// let client = MockLLMClient::new("Hello, world!");
/// let client = MockLLMClient::failing();
/// let client = MockLLMClient::failing_midway("partial answer");
/// ```
#[derive(Clone)]
pub struct MockLLMClient {
    response: String,
    fail_on_start: bool,
    fail_midway: bool,
    prompts: Arc<Mutex<Vec<(String, String)>>>,
    params: Arc<Mutex<Vec<GenerationParams>>>,
}

impl MockLLMClient {
    /// Create a new mock client that returns the given response.
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            fail_on_start: false,
            fail_midway: false,
            prompts: Arc::new(Mutex::new(Vec::new())),
            params: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock client whose requests are rejected outright.
    pub fn failing() -> Self {
        Self {
            fail_on_start: true,
            ..Self::new("")
        }
    }

    /// Create a mock client that streams `partial` and then fails.
    pub fn failing_midway(partial: &str) -> Self {
        Self {
            fail_midway: true,
            ..Self::new(partial)
        }
    }

    /// `(role, prompt)` pairs received so far.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().clone()
    }

    /// Sampling parameters of each request, in order.
    pub fn params(&self) -> Vec<GenerationParams> {
        self.params.lock().clone()
    }

    fn record(&self, prompt: &str, role: &str, params: &GenerationParams) {
        self.prompts.lock().push((role.to_string(), prompt.to_string()));
        self.params.lock().push(*params);
    }

    /// The reply split into the tokens `stream` yields.
    pub fn tokens(&self) -> Vec<String> {
        self.response
            .split_inclusive(' ')
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn generate(
        &self,
        prompt: &str,
        role: &str,
        params: &GenerationParams,
    ) -> Result<String> {
        self.record(prompt, role, params);
        if self.fail_on_start || self.fail_midway {
            return Err(AppError::Backend("Mock LLM failure".to_string()));
        }
        Ok(self.response.clone())
    }

    async fn stream(
        &self,
        prompt: &str,
        role: &str,
        params: &GenerationParams,
    ) -> Result<Box<dyn futures::Stream<Item = Result<String>> + Send + Unpin>> {
        self.record(prompt, role, params);
        if self.fail_on_start {
            return Err(AppError::Backend("Mock LLM failure".to_string()));
        }

        let mut items: Vec<Result<String>> = self.tokens().into_iter().map(Ok).collect();
        if self.fail_midway {
            items.push(Err(AppError::Backend("Mock stream dropped".to_string())));
        }
        Ok(Box::new(stream::iter(items)))
    }

    fn model_name(&self) -> &str {
        "mock-llm"
    }
}

// ============= Embeddings =============

/// Embeds text as keyword counts over a fixed vocabulary.
///
/// Every component gets a small offset so no vector is all zeros.
pub struct KeywordEmbedder {
    model: String,
    vocabulary: Vec<String>,
}

impl KeywordEmbedder {
    pub fn new(model: &str, vocabulary: &[&str]) -> Self {
        Self {
            model: model.to_string(),
            vocabulary: vocabulary.iter().map(|w| w.to_lowercase()).collect(),
        }
    }

    /// Default vocabulary used by most tests.
    pub fn standard(model: &str) -> Self {
        Self::new(model, &["alpha", "beta", "gamma", "delta"])
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        self.vocabulary
            .iter()
            .map(|word| text.matches(word.as_str()).count() as f32 + 0.01)
            .collect()
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Embedder whose every call fails.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed_documents(&self, _: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(AppError::Embedding("Mock embedding failure".to_string()))
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

/// Builds [`KeywordEmbedder`]s for any model name except `"broken"`, which
/// yields a [`FailingEmbedder`].
pub struct KeywordFactory;

#[async_trait]
impl EmbedderFactory for KeywordFactory {
    async fn create(&self, model: &str) -> Result<Arc<dyn Embedder>> {
        if model == "broken" {
            return Ok(Arc::new(FailingEmbedder));
        }
        Ok(Arc::new(KeywordEmbedder::standard(model)))
    }
}

// ============= Session =============

pub fn retrieval_service(store_path: &Path, embedder: Arc<dyn Embedder>) -> RetrievalService {
    let store = VectorStore::new(embedder, Arc::new(KeywordFactory), StoreOptions::default());
    RetrievalService::new(store, store_path)
}

/// Activated session over `store_path` with keyword embeddings and `llm`.
pub async fn test_state(store_path: &Path, llm: MockLLMClient) -> AppState {
    let mut config = TianqiConfig::default();
    config.rag.vector_store_path = store_path.to_path_buf();
    test_state_with(Arc::new(TianqiConfigManager::from_config(config)), llm).await
}

/// Like [`test_state`], with settings read from `config_manager`.
pub async fn test_state_with(
    config_manager: Arc<TianqiConfigManager>,
    llm: MockLLMClient,
) -> AppState {
    let store_path = config_manager.config().rag.vector_store_path.clone();
    let retrieval = Arc::new(retrieval_service(
        &store_path,
        Arc::new(KeywordEmbedder::standard("keywords")),
    ));
    retrieval.activate().await.expect("activate retrieval");

    let backend = Arc::new(GenerationBackend::new(
        Arc::new(llm),
        GenerationParams::default(),
        8,
    ));

    AppState::new(config_manager, retrieval, backend)
}
