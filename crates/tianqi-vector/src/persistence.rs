//! Persistence layer for tianqi-vector.
//!
//! A store is saved as a directory containing two JSON files:
//!
//! - `{path}/manifest.json` - format version, embedding model, counters
//! - `{path}/entries.json` - every entry with its index, text and vector
//!
//! Each file is written to a temporary sibling and renamed into place, so a
//! crash mid-save leaves the previous snapshot readable.

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::index::FlatIndex;
use crate::types::{Entry, EntryIndex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const ENTRIES_FILE: &str = "entries.json";

/// Store metadata written next to the entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreManifest {
    /// On-disk format version.
    pub format_version: u32,
    /// Name of the embedding model every stored vector was produced by.
    pub embedding_model: String,
    /// Vector dimensions, absent for a store that has never held a vector.
    pub dimensions: Option<usize>,
    /// Similarity metric.
    pub metric: DistanceMetric,
    /// Next index to hand out.
    pub next_index: EntryIndex,
    /// Number of entries in `entries.json`.
    pub entry_count: usize,
    /// When the snapshot was written.
    pub saved_at: DateTime<Utc>,
}

/// Write `index` to the directory at `path`, tagging it with `embedding_model`.
#[instrument(skip(index), fields(entries = index.len()))]
pub async fn save(path: &Path, index: &FlatIndex, embedding_model: &str) -> Result<StoreManifest> {
    tokio::fs::create_dir_all(path).await?;

    let entries: Vec<&Entry> = index.entries().collect();
    let manifest = StoreManifest {
        format_version: FORMAT_VERSION,
        embedding_model: embedding_model.to_string(),
        dimensions: index.dimensions(),
        metric: index.metric(),
        next_index: index.next_index(),
        entry_count: entries.len(),
        saved_at: Utc::now(),
    };

    let entries_json = serde_json::to_vec(&entries)
        .map_err(|e| Error::Persistence(format!("Failed to serialize entries: {}", e)))?;
    let manifest_json = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| Error::Persistence(format!("Failed to serialize manifest: {}", e)))?;

    // Entries first: a manifest never points at entries that were not written.
    write_atomic(&path.join(ENTRIES_FILE), &entries_json).await?;
    write_atomic(&path.join(MANIFEST_FILE), &manifest_json).await?;

    info!(path = ?path, model = embedding_model, "Saved vector store");
    Ok(manifest)
}

/// Load a store previously written by [`save`].
///
/// Returns `Ok(None)` when nothing has been saved at `path` yet.
#[instrument]
pub async fn load(path: &Path) -> Result<Option<(StoreManifest, FlatIndex)>> {
    let manifest_path = path.join(MANIFEST_FILE);
    if !tokio::fs::try_exists(&manifest_path).await? {
        debug!(path = ?path, "No saved vector store");
        return Ok(None);
    }

    let manifest_json = tokio::fs::read(&manifest_path).await?;
    let manifest: StoreManifest = serde_json::from_slice(&manifest_json)
        .map_err(|e| Error::Persistence(format!("Failed to parse manifest: {}", e)))?;

    if manifest.format_version != FORMAT_VERSION {
        return Err(Error::Persistence(format!(
            "Unsupported format version {} (expected {})",
            manifest.format_version, FORMAT_VERSION
        )));
    }

    let entries_json = tokio::fs::read(path.join(ENTRIES_FILE)).await?;
    let entries: Vec<Entry> = serde_json::from_slice(&entries_json)
        .map_err(|e| Error::Persistence(format!("Failed to parse entries: {}", e)))?;

    if entries.len() != manifest.entry_count {
        return Err(Error::Persistence(format!(
            "Manifest lists {} entries but {} were found",
            manifest.entry_count,
            entries.len()
        )));
    }

    let index = FlatIndex::from_entries(
        manifest.dimensions,
        manifest.metric,
        manifest.next_index,
        entries,
    )?;

    info!(
        path = ?path,
        model = %manifest.embedding_model,
        entries = index.len(),
        "Loaded vector store"
    );
    Ok(Some((manifest, index)))
}

async fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = tmp_path(target);
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&tmp, target).await?;
    Ok(())
}

fn tmp_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}
