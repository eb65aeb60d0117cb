//! Folder ingestion: load and split documents into chunks ready for the store.

use crate::rag::chunker::TextChunker;
use crate::rag::loader::{load_folder, IngestionError};
use crate::types::{AppError, Result};
use std::path::PathBuf;
use tracing::info;

/// Chunks produced from a folder, in document then position order.
#[derive(Debug, Default)]
pub struct PreparedChunks {
    pub chunks: Vec<String>,
    pub documents: usize,
    pub skipped: Vec<IngestionError>,
}

/// Load every supported file under `folder` and split it into chunks.
///
/// Chunks keep their exact spans so overlaps survive; whitespace-only chunks
/// are dropped. Files that fail to
/// load are reported in `skipped`; a missing folder fails the whole call.
pub async fn prepare_folder(folder: PathBuf, chunker: TextChunker) -> Result<PreparedChunks> {
    tokio::task::spawn_blocking(move || {
        let report = load_folder(&folder)?;

        let mut prepared = PreparedChunks {
            documents: report.documents.len(),
            skipped: report.errors,
            ..Default::default()
        };
        for document in &report.documents {
            prepared.chunks.extend(
                chunker
                    .chunk(&document.text)
                    .into_iter()
                    .filter(|chunk| !chunk.trim().is_empty()),
            );
        }

        info!(
            folder = ?folder,
            documents = prepared.documents,
            chunks = prepared.chunks.len(),
            "Prepared folder for ingestion"
        );
        Ok(prepared)
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_prepare_folder() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x".repeat(1200)).unwrap();
        std::fs::write(dir.path().join("b.md"), "  \n\n  ").unwrap();
        std::fs::write(dir.path().join("c.docx"), b"not a zip").unwrap();

        let prepared = prepare_folder(dir.path().to_path_buf(), TextChunker::new(500, 50).unwrap())
            .await
            .unwrap();

        assert_eq!(prepared.documents, 2);
        assert_eq!(prepared.chunks.len(), 3);
        assert_eq!(prepared.skipped.len(), 1);
        assert!(prepared.chunks.iter().all(|c| c.chars().count() <= 500));
    }

    #[tokio::test]
    async fn test_missing_folder() {
        let result = prepare_folder(
            PathBuf::from("/definitely/not/here"),
            TextChunker::new(500, 50).unwrap(),
        )
        .await;
        assert!(matches!(result, Err(AppError::Ingestion(_))));
    }
}
