//! Exact nearest-neighbour index with stable integer indices.
//!
//! Every query is scored against every stored vector. Personal document
//! stores are small enough that a linear scan is fast, and it keeps deletion
//! exact: a removed entry is gone immediately rather than tombstoned.

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::types::{Entry, EntryIndex, SearchHit};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// In-memory store of embedded chunks.
///
/// The dimensionality is fixed by the first inserted vector and enforced for
/// every later insert and query. Entries are kept ordered by index so that
/// exports and ties in search are deterministic.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimensions: Option<usize>,
    metric: DistanceMetric,
    entries: BTreeMap<EntryIndex, Entry>,
    next_index: EntryIndex,
}

impl FlatIndex {
    /// Create an empty index. Dimensions are taken from the first insert.
    pub fn new(metric: DistanceMetric) -> Self {
        Self {
            dimensions: None,
            metric,
            entries: BTreeMap::new(),
            next_index: 0,
        }
    }

    /// Rebuild an index from previously exported entries.
    ///
    /// `next_index` must be greater than every stored index so that indices
    /// are never reused after a reload.
    pub fn from_entries(
        dimensions: Option<usize>,
        metric: DistanceMetric,
        next_index: EntryIndex,
        entries: Vec<Entry>,
    ) -> Result<Self> {
        let mut index = Self {
            dimensions,
            metric,
            entries: BTreeMap::new(),
            next_index,
        };

        for entry in entries {
            index.validate(&entry.vector)?;
            if entry.index >= next_index {
                return Err(Error::Persistence(format!(
                    "entry index {} is not below next index {}",
                    entry.index, next_index
                )));
            }
            if index.dimensions.is_none() {
                index.dimensions = Some(entry.vector.len());
            }
            if index.entries.insert(entry.index, entry).is_some() {
                return Err(Error::Persistence("duplicate entry index".to_string()));
            }
        }

        Ok(index)
    }

    /// Vector dimensions, if any vector has been stored yet.
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    /// Metric used for scoring.
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Index the next insert will receive.
    pub fn next_index(&self) -> EntryIndex {
        self.next_index
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an entry with this index exists.
    pub fn contains(&self, index: EntryIndex) -> bool {
        self.entries.contains_key(&index)
    }

    /// Look up an entry by index.
    pub fn get(&self, index: EntryIndex) -> Option<&Entry> {
        self.entries.get(&index)
    }

    /// Iterate entries in ascending index order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    /// Insert a batch of `(text, vector)` pairs.
    ///
    /// The batch is validated as a whole before anything is stored, so a bad
    /// vector anywhere in the batch leaves the index unchanged. Returns the
    /// assigned indices in input order.
    pub fn insert_batch(&mut self, items: Vec<(String, Vec<f32>)>) -> Result<Vec<EntryIndex>> {
        let mut dimensions = self.dimensions;
        for (_, vector) in &items {
            check_vector(dimensions, vector)?;
            dimensions.get_or_insert(vector.len());
        }
        self.dimensions = dimensions;

        let mut assigned = Vec::with_capacity(items.len());
        for (text, vector) in items {
            let index = self.next_index;
            self.next_index += 1;
            trace!(index, "Inserted entry");
            self.entries.insert(index, Entry { index, text, vector });
            assigned.push(index);
        }

        debug!(count = assigned.len(), total = self.entries.len(), "Batch inserted");
        Ok(assigned)
    }

    /// Remove the entry stored under `index`. Other entries keep their indices.
    pub fn remove(&mut self, index: EntryIndex) -> Result<Entry> {
        self.entries
            .remove(&index)
            .ok_or(Error::IndexNotFound(index))
    }

    /// Remove every entry. The index counter is kept so indices stay unique
    /// for the lifetime of the store.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Return up to `k` entries ordered by descending similarity to `query`.
    ///
    /// Ties are broken by ascending index so results are deterministic.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        self.validate(query)?;

        let mut scored: Vec<(f32, &Entry)> = self
            .entries
            .values()
            .map(|entry| (self.metric.similarity(query, &entry.vector), entry))
            .collect();

        scored.sort_by(|(sa, ea), (sb, eb)| {
            sb.partial_cmp(sa)
                .unwrap_or(Ordering::Equal)
                .then(ea.index.cmp(&eb.index))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, entry)| SearchHit {
                index: entry.index,
                text: entry.text.clone(),
                score,
            })
            .collect())
    }

    fn validate(&self, vector: &[f32]) -> Result<()> {
        check_vector(self.dimensions, vector)
    }
}

fn check_vector(dimensions: Option<usize>, vector: &[f32]) -> Result<()> {
    if vector.is_empty() {
        return Err(Error::InvalidVector("vector is empty".to_string()));
    }
    match dimensions {
        Some(expected) if expected != vector.len() => {
            return Err(Error::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        _ => {}
    }
    if vector.iter().any(|v| v.is_nan() || v.is_infinite()) {
        return Err(Error::InvalidVector("vector contains NaN or Inf".to_string()));
    }
    Ok(())
}
