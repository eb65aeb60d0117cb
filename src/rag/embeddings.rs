//! Embedding providers.
//!
//! [`EmbeddingProvider`] is resolved once from `[rag.embedding]` and turned
//! into an [`Embedder`] the vector store holds behind an `Arc`. Swapping the
//! model at runtime builds a new embedder from the same provider kind.

use crate::types::{AppError, Result};
use crate::utils::toml_config::EmbeddingConfig;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Maps text to fixed-size vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per text in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_documents(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Embedding("Provider returned no vector".to_string()))
    }

    /// Identifier of the model producing the vectors.
    fn model_name(&self) -> &str;
}

/// Builds embedders for a named model. Used when the model changes at runtime.
#[async_trait]
pub trait EmbedderFactory: Send + Sync {
    async fn create(&self, model: &str) -> Result<Arc<dyn Embedder>>;
}

#[async_trait]
impl EmbedderFactory for EmbeddingProvider {
    async fn create(&self, model: &str) -> Result<Arc<dyn Embedder>> {
        self.with_model(model).create_embedder().await
    }
}

/// Embedding backends, resolved at configuration time.
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingProvider {
    /// Embeddings served by an Ollama instance
    Ollama { base_url: String, model: String },
    /// In-process ONNX models via fastembed
    FastEmbed {
        model: String,
        cache_dir: Option<PathBuf>,
        device: String,
    },
}

impl EmbeddingProvider {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        match config {
            EmbeddingConfig::Ollama { base_url, model } => EmbeddingProvider::Ollama {
                base_url: base_url.clone(),
                model: model.clone(),
            },
            EmbeddingConfig::FastEmbed {
                model,
                model_path,
                device,
            } => EmbeddingProvider::FastEmbed {
                model: model.clone(),
                cache_dir: model_path.clone(),
                device: device.clone(),
            },
        }
    }

    /// Same backend, different model.
    pub fn with_model(&self, model: &str) -> Self {
        let mut next = self.clone();
        match &mut next {
            EmbeddingProvider::Ollama { model: m, .. }
            | EmbeddingProvider::FastEmbed { model: m, .. } => *m = model.to_string(),
        }
        next
    }

    pub fn model(&self) -> &str {
        match self {
            EmbeddingProvider::Ollama { model, .. } | EmbeddingProvider::FastEmbed { model, .. } => {
                model
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EmbeddingProvider::Ollama { .. } => "Ollama",
            EmbeddingProvider::FastEmbed { .. } => "FastEmbed",
        }
    }

    /// Build the embedder for this provider.
    pub async fn create_embedder(&self) -> Result<Arc<dyn Embedder>> {
        info!(provider = self.name(), model = self.model(), "Creating embedder");

        match self {
            #[cfg(feature = "ollama")]
            EmbeddingProvider::Ollama { base_url, model } => {
                Ok(Arc::new(OllamaEmbedder::new(base_url, model.clone())))
            }
            #[cfg(not(feature = "ollama"))]
            EmbeddingProvider::Ollama { .. } => Err(AppError::Configuration(
                "Ollama embeddings require the `ollama` feature".to_string(),
            )),

            #[cfg(feature = "local-embeddings")]
            EmbeddingProvider::FastEmbed {
                model,
                cache_dir,
                device,
            } => Ok(Arc::new(
                FastEmbedEmbedder::new(model, cache_dir.clone(), device).await?,
            )),
            #[cfg(not(feature = "local-embeddings"))]
            EmbeddingProvider::FastEmbed { .. } => Err(AppError::Configuration(
                "fastembed embeddings require the `local-embeddings` feature".to_string(),
            )),
        }
    }
}

/// Embed `texts` in batches of `batch_size`, with up to `concurrency` batches
/// in flight. Output order always matches input order.
pub async fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
    concurrency: usize,
) -> Result<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    // Owned batches keep the futures free of borrows into `texts`
    let batches: Vec<Vec<String>> = texts.chunks(batch_size).map(<[String]>::to_vec).collect();
    let batches: Vec<Vec<Vec<f32>>> = futures::stream::iter(batches)
        .map(|batch| async move {
            let vectors = embedder.embed_documents(&batch).await?;
            if vectors.len() != batch.len() {
                return Err(AppError::Embedding(format!(
                    "Provider returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }
            Ok(vectors)
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    let vectors: Vec<Vec<f32>> = batches.into_iter().flatten().collect();
    debug!(count = vectors.len(), model = embedder.model_name(), "Embedded texts");
    Ok(vectors)
}

// ============= Ollama =============

#[cfg(feature = "ollama")]
pub struct OllamaEmbedder {
    client: ollama_rs::Ollama,
    model: String,
}

#[cfg(feature = "ollama")]
impl OllamaEmbedder {
    pub fn new(base_url: &str, model: String) -> Self {
        Self {
            client: crate::llm::ollama::connect(base_url),
            model,
        }
    }
}

#[cfg(feature = "ollama")]
#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        use ollama_rs::generation::embeddings::request::{
            EmbeddingsInput, GenerateEmbeddingsRequest,
        };

        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = GenerateEmbeddingsRequest::new(
            self.model.clone(),
            EmbeddingsInput::Multiple(texts.to_vec()),
        );

        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| AppError::Embedding(format!("Ollama error: {}", e)))?;

        Ok(response.embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============= FastEmbed =============

#[cfg(feature = "local-embeddings")]
pub struct FastEmbedEmbedder {
    model: Arc<parking_lot::Mutex<fastembed::TextEmbedding>>,
    name: String,
}

#[cfg(feature = "local-embeddings")]
impl FastEmbedEmbedder {
    pub async fn new(model_code: &str, cache_dir: Option<PathBuf>, device: &str) -> Result<Self> {
        use fastembed::{InitOptions, TextEmbedding};

        if !device.eq_ignore_ascii_case("cpu") {
            tracing::warn!(device, "Only CPU execution is available, ignoring device");
        }

        let info = TextEmbedding::list_supported_models()
            .into_iter()
            .find(|m| m.model_code.eq_ignore_ascii_case(model_code))
            .ok_or_else(|| {
                AppError::Embedding(format!("Unsupported fastembed model: {}", model_code))
            })?;

        let mut options = InitOptions::new(info.model).with_show_download_progress(true);
        if let Some(dir) = cache_dir {
            options = options.with_cache_dir(dir);
        }

        // Model loading reads and initialises ONNX weights; keep it off the runtime
        let model = tokio::task::spawn_blocking(move || TextEmbedding::try_new(options))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?
            .map_err(|e| AppError::Embedding(e.to_string()))?;

        Ok(Self {
            model: Arc::new(parking_lot::Mutex::new(model)),
            name: model_code.to_string(),
        })
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl Embedder for FastEmbedEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || model.lock().embed(texts, None))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?
            .map_err(|e| AppError::Embedding(e.to_string()))
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}
