//! Retrieval service: the only door into the vector store.
//!
//! Mutations take the write lock, so at most one is in flight, and each one
//! is saved to disk before the lock is released. A mutation whose save fails
//! is undone in memory, so memory never runs ahead of disk. Searches share the read
//! lock and run concurrently with each other but never alongside a mutation.
//! Nothing is served until the session has activated retrieval.

use crate::rag::vector_store::{StoreSnapshot, VectorStore};
use crate::types::{AppError, Result, StoreState};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tianqi_vector::{EntryIndex, SearchHit};
use tokio::sync::RwLock;
use tracing::{error, info, instrument};

/// Point-in-time view of the store for health reporting.
#[derive(Debug, Clone)]
pub struct StoreStatus {
    pub activated: bool,
    pub state: StoreState,
    pub entry_count: usize,
    pub embedding_model: String,
}

pub struct RetrievalService {
    store: RwLock<VectorStore>,
    store_path: PathBuf,
    activated: AtomicBool,
}

impl RetrievalService {
    pub fn new(store: VectorStore, store_path: impl Into<PathBuf>) -> Self {
        Self {
            store: RwLock::new(store),
            store_path: store_path.into(),
            activated: AtomicBool::new(false),
        }
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Enable retrieval for this session, loading any saved store first.
    #[instrument(skip(self), fields(path = ?self.store_path))]
    pub async fn activate(&self) -> Result<()> {
        {
            let mut store = self.store.write().await;
            store.load(&self.store_path).await?;
        }
        self.activated.store(true, Ordering::SeqCst);
        info!("Retrieval activated");
        Ok(())
    }

    pub fn deactivate(&self) {
        self.activated.store(false, Ordering::SeqCst);
        info!("Retrieval deactivated");
    }

    pub fn is_activated(&self) -> bool {
        self.activated.load(Ordering::SeqCst)
    }

    fn ensure_activated(&self) -> Result<()> {
        if self.is_activated() {
            Ok(())
        } else {
            Err(AppError::NotActivated)
        }
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    pub async fn add_texts(&self, texts: Vec<String>) -> Result<Vec<EntryIndex>> {
        self.ensure_activated()?;
        let mut store = self.store.write().await;
        let snapshot = store.snapshot();
        let assigned = store.add(texts).await?;
        self.persist(&mut store, snapshot).await?;
        Ok(assigned)
    }

    /// Scored hits, best first.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        self.ensure_activated()?;
        let store = self.store.read().await;
        store.search(query, k).await
    }

    /// Texts of the `k` best matches, best first.
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<String>> {
        Ok(self
            .search(query, k)
            .await?
            .into_iter()
            .map(|hit| hit.text)
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn delete_by_index(&self, index: EntryIndex) -> Result<()> {
        self.ensure_activated()?;
        let mut store = self.store.write().await;
        let snapshot = store.snapshot();
        store.delete_by_index(index)?;
        self.persist(&mut store, snapshot).await
    }

    #[instrument(skip(self))]
    pub async fn delete_all(&self) -> Result<()> {
        self.ensure_activated()?;
        let mut store = self.store.write().await;
        let snapshot = store.snapshot();
        store.delete_all();
        self.persist(&mut store, snapshot).await
    }

    #[instrument(skip(self, new_text))]
    pub async fn update_text(&self, index: EntryIndex, new_text: String) -> Result<EntryIndex> {
        self.ensure_activated()?;
        let mut store = self.store.write().await;
        let snapshot = store.snapshot();
        let new_index = store.update(index, new_text).await?;
        self.persist(&mut store, snapshot).await?;
        Ok(new_index)
    }

    #[instrument(skip(self))]
    pub async fn change_embedding_model(&self, model: &str) -> Result<()> {
        self.ensure_activated()?;
        let mut store = self.store.write().await;
        let snapshot = store.snapshot();
        store.change_embedding_model(model).await?;
        self.persist(&mut store, snapshot).await
    }

    pub async fn status(&self) -> StoreStatus {
        let store = self.store.read().await;
        StoreStatus {
            activated: self.is_activated(),
            state: store.state(),
            entry_count: store.len(),
            embedding_model: store.model_name().to_string(),
        }
    }

    /// Save the mutated store, or roll memory back to `snapshot`.
    async fn persist(&self, store: &mut VectorStore, snapshot: StoreSnapshot) -> Result<()> {
        if let Err(e) = store.save(&self.store_path).await {
            error!(
                path = ?self.store_path,
                error = %e,
                "Failed to save vector store, rolling back"
            );
            store.restore(snapshot);
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::embeddings::{Embedder, EmbedderFactory};
    use crate::rag::vector_store::StoreOptions;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct LetterEmbedder(String);

    #[async_trait]
    impl Embedder for LetterEmbedder {
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    ('a'..='d')
                        .map(|c| t.matches(c).count() as f32 + 0.01)
                        .collect()
                })
                .collect())
        }

        fn model_name(&self) -> &str {
            &self.0
        }
    }

    struct LetterFactory;

    #[async_trait]
    impl EmbedderFactory for LetterFactory {
        async fn create(&self, model: &str) -> Result<Arc<dyn Embedder>> {
            Ok(Arc::new(LetterEmbedder(model.to_string())))
        }
    }

    fn service(dir: &TempDir) -> RetrievalService {
        let store = VectorStore::new(
            Arc::new(LetterEmbedder("letters".to_string())),
            Arc::new(LetterFactory),
            StoreOptions::default(),
        );
        RetrievalService::new(store, dir.path().join("store"))
    }

    #[tokio::test]
    async fn test_not_activated() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);

        assert!(matches!(
            service.add_texts(vec!["a".into()]).await,
            Err(AppError::NotActivated)
        ));
        assert!(matches!(
            service.similarity_search("a", 1).await,
            Err(AppError::NotActivated)
        ));
        assert!(matches!(
            service.delete_all().await,
            Err(AppError::NotActivated)
        ));
    }

    #[tokio::test]
    async fn test_mutations_are_persisted() {
        let dir = TempDir::new().unwrap();
        let first = service(&dir);
        first.activate().await.unwrap();
        first
            .add_texts(vec!["aaa".into(), "bbb".into(), "ccc".into()])
            .await
            .unwrap();
        first.delete_by_index(1).await.unwrap();

        let second = service(&dir);
        second.activate().await.unwrap();
        let status = second.status().await;

        assert_eq!(status.entry_count, 2);
        assert_eq!(status.state, StoreState::Populated);
        assert_eq!(second.similarity_search("ccc", 1).await.unwrap(), vec!["ccc"]);
    }

    #[tokio::test]
    async fn test_change_model_persists_new_model() {
        let dir = TempDir::new().unwrap();
        let first = service(&dir);
        first.activate().await.unwrap();
        first.add_texts(vec!["abc".into()]).await.unwrap();
        first.change_embedding_model("letters-v2").await.unwrap();

        let manifest = tianqi_vector::persistence::load(first.store_path())
            .await
            .unwrap()
            .unwrap()
            .0;
        assert_eq!(manifest.embedding_model, "letters-v2");
        assert_eq!(first.status().await.embedding_model, "letters-v2");
    }

    #[tokio::test]
    async fn test_failed_save_rolls_back_memory() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        service.activate().await.unwrap();

        // A regular file where the store directory should be
        std::fs::write(service.store_path(), b"").unwrap();
        assert!(service.add_texts(vec!["abc".into()]).await.is_err());
        assert_eq!(service.status().await.state, StoreState::Absent);

        std::fs::remove_file(service.store_path()).unwrap();
        service.add_texts(vec!["abc".into(), "bcd".into()]).await.unwrap();
        std::fs::remove_dir_all(service.store_path()).unwrap();
        std::fs::write(service.store_path(), b"").unwrap();

        assert!(service.add_texts(vec!["cd".into()]).await.is_err());
        assert!(service.delete_by_index(0).await.is_err());
        assert!(service.update_text(1, "dd".into()).await.is_err());
        assert!(service.delete_all().await.is_err());
        assert!(service.change_embedding_model("letters-v2").await.is_err());

        let status = service.status().await;
        assert_eq!(status.entry_count, 2);
        assert_eq!(status.embedding_model, "letters");
        assert_eq!(service.similarity_search("bcd", 1).await.unwrap(), vec!["bcd"]);
    }

    #[tokio::test]
    async fn test_delete_missing_index() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir);
        service.activate().await.unwrap();
        service.add_texts(vec!["a".into()]).await.unwrap();

        assert!(matches!(
            service.delete_by_index(5).await,
            Err(AppError::IndexNotFound(5))
        ));
    }
}
