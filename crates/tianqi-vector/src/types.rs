//! Common types for tianqi-vector.

use serde::{Deserialize, Serialize};

/// Stable integer index of a stored entry.
///
/// Indices are handed out from a monotonically increasing counter and are
/// never reused, even after the entry they named has been deleted.
pub type EntryIndex = u64;

/// A stored chunk together with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Stable index of this entry.
    pub index: EntryIndex,
    /// Chunk text the vector was computed from.
    pub text: String,
    /// Embedding of `text`.
    pub vector: Vec<f32>,
}

/// Result of a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Index of the matched entry.
    pub index: EntryIndex,
    /// Text of the matched entry.
    pub text: String,
    /// Similarity score (higher = more similar).
    pub score: f32,
}
