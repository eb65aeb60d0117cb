//! Retrieval Augmented Generation (RAG) Pipeline
//!
//! # Module Structure
//!
//! - [`loader`] - Text, Word and PDF document loading
//! - [`chunker`] - Overlapping character-count chunking
//! - [`ingest`] - Folder to cleaned chunks
//! - [`embeddings`] - Embedding providers (Ollama, fastembed)
//! - [`cache`] - LRU cache of query embeddings
//! - [`vector_store`] - Embedded chunks under stable indices
//! - [`retrieval`] - Session-gated, persisted access to the store
//! - [`orchestrator`] - Retrieval plus generation as one event stream
//!
//! # RAG Pipeline
//!
//! 1. **Ingestion** - Documents are loaded, chunked and embedded
//! 2. **Storage** - Vectors are kept in a flat index and saved after each change
//! 3. **Retrieval** - The query is embedded and the nearest chunks returned
//! 4. **Generation** - The LLM answers with the chunks as reference material
//!
//! # Example
//!
//! ```ignore
//! use tianqi::rag::{chunker::TextChunker, ingest::prepare_folder};
//!
//! let prepared = prepare_folder("./docs".into(), TextChunker::new(500, 50)?).await?;
//! retrieval.add_texts(prepared.chunks).await?;
//!
//! let context = retrieval.similarity_search("what is tianqi?", 5).await?;
//! ```

pub mod cache;
pub mod chunker;
pub mod embeddings;
pub mod ingest;
pub mod loader;
pub mod orchestrator;
pub mod retrieval;
pub mod vector_store;
