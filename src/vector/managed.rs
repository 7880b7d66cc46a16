//! Managed index: stores raw texts and owns the embedding function.
//!
//! Callers hand it text at build and query time. Entry embeddings are
//! computed lazily on the first query and cached for the life of the index.

use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::vector::index::{nearest, validate_new_ids};
use crate::vector::{
    BackendKind, EmbeddingGenerator, IndexEntries, IndexMetadata, Neighbor, QueryInput,
    VectorDimension, VectorError, VectorIndex, VerseId,
};

/// File name of the stored texts inside an index directory.
pub const TEXTS_FILE: &str = "texts.json";

/// Encoder batch size used when filling the embedding cache.
const CACHE_BATCH_SIZE: usize = 64;

#[derive(Debug, Serialize, Deserialize)]
struct StoredText {
    id: VerseId,
    text: String,
}

pub struct ManagedIndex {
    generator: Arc<dyn EmbeddingGenerator>,
    ids: Vec<VerseId>,
    texts: Vec<String>,
    embeddings: OnceLock<Vec<Vec<f32>>>,
    /// Held while the cache is being filled so only one caller encodes.
    fill_lock: Mutex<()>,
}

impl std::fmt::Debug for ManagedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedIndex")
            .field("model", &self.generator.model_name())
            .field("entries", &self.ids.len())
            .field("cached", &self.embeddings.get().is_some())
            .finish()
    }
}

impl ManagedIndex {
    #[must_use]
    pub fn new(generator: Arc<dyn EmbeddingGenerator>) -> Self {
        Self {
            generator,
            ids: Vec::new(),
            texts: Vec::new(),
            embeddings: OnceLock::new(),
            fill_lock: Mutex::new(()),
        }
    }

    /// Loads the texts persisted in `dir`.
    ///
    /// `generator` must be the model recorded in `metadata`; embeddings are
    /// recomputed with it on first use.
    pub fn load(
        dir: &Path,
        metadata: &IndexMetadata,
        generator: Arc<dyn EmbeddingGenerator>,
    ) -> Result<Self, StorageError> {
        let path = dir.join(TEXTS_FILE);
        let corrupt = |reason: String| StorageError::Corrupt {
            path: path.clone(),
            reason,
        };

        if generator.model_name() != metadata.model_name {
            return Err(StorageError::Incompatible {
                path: dir.to_path_buf(),
                reason: format!(
                    "built with model {}, got {}",
                    metadata.model_name,
                    generator.model_name()
                ),
            });
        }

        let json = std::fs::read_to_string(&path)
            .map_err(|e| corrupt(format!("unreadable text store: {e}")))?;
        let stored: Vec<StoredText> =
            serde_json::from_str(&json).map_err(|e| corrupt(format!("invalid text store: {e}")))?;

        if stored.len() != metadata.entry_count {
            return Err(corrupt(format!(
                "text store holds {} entries, metadata says {}",
                stored.len(),
                metadata.entry_count
            )));
        }

        let (ids, texts): (Vec<VerseId>, Vec<String>) =
            stored.into_iter().map(|s| (s.id, s.text)).unzip();

        let mut index = Self::new(generator);
        index
            .add(&ids, IndexEntries::Texts(&texts))
            .map_err(|e| corrupt(e.to_string()))?;
        Ok(index)
    }

    /// Entry embeddings, computing them on first use.
    fn embeddings(&self) -> Result<&[Vec<f32>], VectorError> {
        if let Some(cached) = self.embeddings.get() {
            return Ok(cached);
        }

        let _fill = self.fill_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = self.embeddings.get() {
            return Ok(cached);
        }

        let texts: Vec<&str> = self.texts.iter().map(String::as_str).collect();
        let computed = self
            .generator
            .encode_batch(&texts, CACHE_BATCH_SIZE)
            .map_err(|e| VectorError::EmbeddingFailed(e.to_string()))?;

        tracing::debug!(
            model = self.generator.model_name(),
            entries = computed.len(),
            "filled managed index embedding cache"
        );

        Ok(self.embeddings.get_or_init(|| computed))
    }
}

impl VectorIndex for ManagedIndex {
    fn backend(&self) -> BackendKind {
        BackendKind::Managed
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn dimension(&self) -> VectorDimension {
        self.generator.dimension()
    }

    fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    fn accepts_text(&self) -> bool {
        true
    }

    fn add(&mut self, ids: &[VerseId], entries: IndexEntries<'_>) -> Result<(), VectorError> {
        let IndexEntries::Texts(texts) = entries else {
            return Err(VectorError::UnsupportedInput {
                backend: BackendKind::Managed.as_str(),
                input: entries.kind(),
            });
        };

        validate_new_ids(&self.ids, ids, texts.len())?;

        self.ids.extend_from_slice(ids);
        self.texts.extend(texts.iter().cloned());
        self.embeddings = OnceLock::new();
        Ok(())
    }

    fn query(&self, input: QueryInput<'_>, k: usize) -> Result<Vec<Neighbor>, VectorError> {
        if k == 0 {
            return Err(VectorError::InvalidK(k));
        }
        if self.ids.is_empty() {
            return Ok(Vec::new());
        }

        let encoded;
        let query: &[f32] = match input {
            QueryInput::Vector(vector) => vector,
            QueryInput::Text(text) => {
                encoded = self
                    .generator
                    .encode(text)
                    .map_err(|e| VectorError::EmbeddingFailed(e.to_string()))?;
                &encoded
            }
        };
        self.dimension().validate_vector(query)?;

        let embeddings = self.embeddings()?;
        let entries = self
            .ids
            .iter()
            .copied()
            .zip(embeddings.iter().map(Vec::as_slice));
        Ok(nearest(query, entries, k))
    }

    fn persist(&self, dir: &Path) -> Result<(), StorageError> {
        let path = dir.join(TEXTS_FILE);
        let stored: Vec<StoredText> = self
            .ids
            .iter()
            .zip(&self.texts)
            .map(|(id, text)| StoredText {
                id: *id,
                text: text.clone(),
            })
            .collect();

        let json = serde_json::to_string(&stored).map_err(|e| StorageError::Write {
            path: path.clone(),
            source: std::io::Error::other(e),
        })?;
        std::fs::write(&path, json).map_err(|source| StorageError::Write { path, source })
    }
}
