//! Metadata persisted next to every index.
//!
//! Records which backend and embedding model produced the index and a
//! fingerprint of the corpus it was built from, so that a query-time process
//! can refuse incompatible indexes and notice a desynchronized corpus.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::vector::BackendKind;

/// File name of the metadata inside an index directory.
pub const METADATA_FILE: &str = "metadata.json";

/// Metadata for a persisted index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    /// Version of the metadata format
    pub version: u32,

    pub backend: BackendKind,

    /// Name of the embedding model used
    pub model_name: String,

    /// Dimension of embeddings
    pub dimension: usize,

    /// Number of indexed entries
    pub entry_count: usize,

    /// Length of the corpus the index was built from
    pub corpus_len: usize,

    /// Hex SHA-256 of the corpus the index was built from
    pub corpus_checksum: String,

    /// Unix timestamp when created
    pub created_at: i64,
}

impl IndexMetadata {
    /// Current metadata version
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(
        backend: BackendKind,
        model_name: String,
        dimension: usize,
        entry_count: usize,
        corpus_len: usize,
        corpus_checksum: String,
    ) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            backend,
            model_name,
            dimension,
            entry_count,
            corpus_len,
            corpus_checksum,
            created_at: Utc::now().timestamp(),
        }
    }

    /// Save metadata into the index directory `dir`
    pub fn save(&self, dir: &Path) -> Result<(), StorageError> {
        let metadata_path = dir.join(METADATA_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| StorageError::Write {
            path: metadata_path.clone(),
            source: std::io::Error::other(e),
        })?;
        std::fs::write(&metadata_path, json).map_err(|source| StorageError::Write {
            path: metadata_path,
            source,
        })
    }

    /// Load metadata from the index directory `dir`
    pub fn load(dir: &Path) -> Result<Self, StorageError> {
        let metadata_path = dir.join(METADATA_FILE);
        if !metadata_path.exists() {
            return Err(StorageError::Missing {
                path: dir.to_path_buf(),
            });
        }

        let json = std::fs::read_to_string(&metadata_path).map_err(|e| StorageError::Corrupt {
            path: metadata_path.clone(),
            reason: format!("unreadable metadata: {e}"),
        })?;

        let metadata: Self = serde_json::from_str(&json).map_err(|e| StorageError::Corrupt {
            path: metadata_path.clone(),
            reason: format!("invalid metadata: {e}"),
        })?;

        if metadata.version != Self::CURRENT_VERSION {
            return Err(StorageError::Incompatible {
                path: dir.to_path_buf(),
                reason: format!(
                    "metadata version {} is not supported (expected {})",
                    metadata.version,
                    Self::CURRENT_VERSION
                ),
            });
        }

        Ok(metadata)
    }

    /// Check if metadata file exists
    pub fn exists(dir: &Path) -> bool {
        dir.join(METADATA_FILE).exists()
    }
}
