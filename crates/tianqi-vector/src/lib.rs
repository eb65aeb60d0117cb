//! # tianqi-vector
//!
//! Embedded vector store for the tianqi retrieval engine.
//!
//! Entries are `(index, text, vector)` triples. Indices come from a counter
//! that only ever grows, so an index handed to a client keeps naming the same
//! chunk until that chunk is deleted, and is never reused afterwards.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tianqi_vector::{persistence, DistanceMetric, FlatIndex};
//!
//! let mut index = FlatIndex::new(DistanceMetric::Cosine);
//! let ids = index.insert_batch(vec![("hello".into(), vec![0.1, 0.9])])?;
//! let hits = index.search(&[0.1, 0.9], 5)?;
//!
//! persistence::save(path, &index, "nomic-embed-text").await?;
//! let (manifest, index) = persistence::load(path).await?.expect("saved above");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod distance;
pub mod error;
pub mod index;
pub mod persistence;
pub mod types;

pub use distance::DistanceMetric;
pub use error::{Error, Result};
pub use index::FlatIndex;
pub use persistence::StoreManifest;
pub use types::{Entry, EntryIndex, SearchHit};
