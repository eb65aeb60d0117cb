//! Vector store: embedded chunks under stable indices.
//!
//! Wraps a [`FlatIndex`] together with the embedder that produced its
//! vectors. The store is either absent (nothing created or loaded yet) or
//! initialized, possibly empty. All mutations are atomic: when embedding
//! fails, the store is left exactly as it was.

use crate::rag::cache::QueryEmbeddingCache;
use crate::rag::embeddings::{embed_in_batches, Embedder, EmbedderFactory};
use crate::types::{AppError, Result, StoreState};
use crate::utils::toml_config::RagConfig;
use std::path::Path;
use std::sync::Arc;
use tianqi_vector::{persistence, DistanceMetric, Entry, EntryIndex, FlatIndex, SearchHit};
use tracing::{debug, info, instrument, warn};

/// Tunables for a [`VectorStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub metric: DistanceMetric,
    pub batch_size: usize,
    pub concurrency: usize,
    pub query_cache_capacity: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::from(&RagConfig::default())
    }
}

impl From<&RagConfig> for StoreOptions {
    fn from(config: &RagConfig) -> Self {
        Self {
            metric: config.metric,
            batch_size: config.embedding_batch_size,
            concurrency: config.embedding_concurrency,
            query_cache_capacity: config.query_cache_capacity,
        }
    }
}

/// Saved model and entries, used to undo a mutation.
pub struct StoreSnapshot {
    embedder: Arc<dyn Embedder>,
    index: Option<FlatIndex>,
}

pub struct VectorStore {
    embedder: Arc<dyn Embedder>,
    factory: Arc<dyn EmbedderFactory>,
    index: Option<FlatIndex>,
    options: StoreOptions,
    query_cache: QueryEmbeddingCache,
}

impl VectorStore {
    /// Create an absent store.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        factory: Arc<dyn EmbedderFactory>,
        options: StoreOptions,
    ) -> Self {
        let query_cache = QueryEmbeddingCache::new(options.query_cache_capacity);
        Self {
            embedder,
            factory,
            index: None,
            options,
            query_cache,
        }
    }

    pub fn state(&self) -> StoreState {
        match &self.index {
            None => StoreState::Absent,
            Some(index) if index.is_empty() => StoreState::Empty,
            Some(_) => StoreState::Populated,
        }
    }

    pub fn len(&self) -> usize {
        self.index.as_ref().map(FlatIndex::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    /// Entry stored under `index`, if any.
    pub fn get(&self, index: EntryIndex) -> Option<&Entry> {
        self.index.as_ref().and_then(|i| i.get(index))
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            embedder: Arc::clone(&self.embedder),
            index: self.index.clone(),
        }
    }

    /// Put back the model and entries captured by [`VectorStore::snapshot`].
    /// Cached query vectors are keyed by model and stay valid.
    pub fn restore(&mut self, snapshot: StoreSnapshot) {
        self.embedder = snapshot.embedder;
        self.index = snapshot.index;
        warn!(model = self.model_name(), entries = self.len(), "Restored vector store");
    }

    /// Query cache for inspection.
    pub fn query_cache(&self) -> &QueryEmbeddingCache {
        &self.query_cache
    }

    /// Build a fresh store from `texts`, replacing whatever was there.
    #[instrument(skip(self, texts), fields(count = texts.len()))]
    pub async fn create(&mut self, texts: Vec<String>) -> Result<Vec<EntryIndex>> {
        let vectors = self.embed(&texts).await?;

        let mut index = FlatIndex::new(self.options.metric);
        let assigned = index.insert_batch(texts.into_iter().zip(vectors).collect())?;
        self.index = Some(index);

        info!(entries = assigned.len(), model = self.model_name(), "Created vector store");
        Ok(assigned)
    }

    /// Append `texts` under new indices, creating the store if absent.
    #[instrument(skip(self, texts), fields(count = texts.len()))]
    pub async fn add(&mut self, texts: Vec<String>) -> Result<Vec<EntryIndex>> {
        if self.index.is_none() {
            return self.create(texts).await;
        }

        let vectors = self.embed(&texts).await?;
        let index = self.index.as_mut().ok_or(AppError::NotInitialized)?;
        let assigned = index.insert_batch(texts.into_iter().zip(vectors).collect())?;

        debug!(added = assigned.len(), total = index.len(), "Added texts");
        Ok(assigned)
    }

    /// Up to `k` entries, best match first.
    #[instrument(skip(self, query))]
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let index = self.index.as_ref().ok_or(AppError::NotInitialized)?;
        if index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embed_query(query).await?;
        Ok(index.search(&vector, k)?)
    }

    /// Remove one entry. Other indices are unchanged.
    #[instrument(skip(self))]
    pub fn delete_by_index(&mut self, index: EntryIndex) -> Result<()> {
        let store = self.index.as_mut().ok_or(AppError::NotInitialized)?;
        store.remove(index)?;
        debug!(index, remaining = store.len(), "Deleted entry");
        Ok(())
    }

    /// Reset to an initialized, empty store.
    #[instrument(skip(self))]
    pub fn delete_all(&mut self) {
        match self.index.as_mut() {
            Some(index) => index.clear(),
            None => self.index = Some(FlatIndex::new(self.options.metric)),
        }
        info!("Cleared vector store");
    }

    /// Replace the text at `index`. The new text gets a new index.
    ///
    /// The replacement is embedded before anything is removed, so a failed
    /// embedding keeps the old entry.
    #[instrument(skip(self, text))]
    pub async fn update(&mut self, index: EntryIndex, text: String) -> Result<EntryIndex> {
        let exists = self
            .index
            .as_ref()
            .ok_or(AppError::NotInitialized)?
            .contains(index);
        if !exists {
            return Err(AppError::IndexNotFound(index));
        }

        let vector = self
            .embed(std::slice::from_ref(&text))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Embedding("Provider returned no vector".to_string()))?;
        let store = self.index.as_mut().ok_or(AppError::NotInitialized)?;
        store.remove(index)?;
        let assigned = store.insert_batch(vec![(text, vector)])?;

        let new_index = assigned.first().copied().ok_or_else(|| {
            AppError::Internal("Insert returned no index".to_string())
        })?;
        debug!(old = index, new = new_index, "Updated entry");
        Ok(new_index)
    }

    /// Persist to `path`. An absent store has nothing to write.
    pub async fn save(&self, path: &Path) -> Result<()> {
        match &self.index {
            Some(index) => {
                persistence::save(path, index, self.model_name()).await?;
            }
            None => debug!(path = ?path, "Store absent, nothing to save"),
        }
        Ok(())
    }

    /// Restore from `path`.
    ///
    /// Returns `false` and leaves memory untouched when nothing is saved
    /// there. Entries saved under a different model are re-embedded with the
    /// current one, keeping their indices.
    pub async fn load(&mut self, path: &Path) -> Result<bool> {
        let Some((manifest, index)) = persistence::load(path).await? else {
            warn!(path = ?path, "No saved vector store, keeping current state");
            return Ok(false);
        };

        let index = if manifest.embedding_model != self.model_name() {
            warn!(
                saved = %manifest.embedding_model,
                current = self.model_name(),
                "Saved store uses a different embedding model, re-embedding"
            );
            self.reembed(self.embedder.as_ref(), &index).await?
        } else {
            index
        };

        self.index = Some(index);
        Ok(true)
    }

    /// Switch to another embedding model.
    ///
    /// Every stored entry is re-embedded with the new model before the swap,
    /// so stored vectors and query vectors always come from the same model.
    /// On failure the old model and vectors stay in place.
    #[instrument(skip(self))]
    pub async fn change_embedding_model(&mut self, model: &str) -> Result<()> {
        let embedder = self.factory.create(model).await?;

        let index = match &self.index {
            Some(index) => Some(self.reembed(embedder.as_ref(), index).await?),
            None => None,
        };

        let previous = self.model_name().to_string();
        self.embedder = embedder;
        self.index = index;
        self.query_cache.clear();

        info!(from = %previous, to = model, entries = self.len(), "Changed embedding model");
        Ok(())
    }

    async fn reembed(&self, embedder: &dyn Embedder, index: &FlatIndex) -> Result<FlatIndex> {
        let entries: Vec<&Entry> = index.entries().collect();
        let texts: Vec<String> = entries.iter().map(|e| e.text.clone()).collect();
        let vectors = embed_in_batches(
            embedder,
            &texts,
            self.options.batch_size,
            self.options.concurrency,
        )
        .await?;

        let rebuilt = entries
            .into_iter()
            .zip(vectors)
            .map(|(entry, vector)| Entry {
                index: entry.index,
                text: entry.text.clone(),
                vector,
            })
            .collect();

        Ok(FlatIndex::from_entries(
            None,
            index.metric(),
            index.next_index(),
            rebuilt,
        )?)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        embed_in_batches(
            self.embedder.as_ref(),
            texts,
            self.options.batch_size,
            self.options.concurrency,
        )
        .await
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let model = self.model_name();
        if let Some(vector) = self.query_cache.get(query, model) {
            return Ok(vector);
        }

        let vector = self.embedder.embed_query(query).await?;
        self.query_cache.put(query, model, vector.clone());
        Ok(vector)
    }
}
