//! Exact brute-force index over precomputed vectors.

use std::collections::HashSet;
use std::path::Path;

use crate::error::StorageError;
use crate::vector::index::{nearest, validate_new_ids};
use crate::vector::{
    BackendKind, IndexEntries, IndexMetadata, MmapVectorStorage, Neighbor, QueryInput,
    VectorDimension, VectorError, VectorIndex, VerseId,
};

/// File name of the vector data inside an index directory.
pub const VECTORS_FILE: &str = "vectors.vsix";

/// Flat (exhaustive) index.
///
/// Every query computes the squared L2 distance to every stored vector, so
/// results are exact. Vectors are kept in memory in insertion order.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: VectorDimension,
    model_name: String,
    ids: Vec<VerseId>,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    /// Creates an empty index for vectors produced by `model_name`.
    #[must_use]
    pub fn new(dimension: VectorDimension, model_name: impl Into<String>) -> Self {
        Self {
            dimension,
            model_name: model_name.into(),
            ids: Vec::new(),
            vectors: Vec::new(),
        }
    }

    /// Loads the vectors persisted in `dir`, checking them against `metadata`.
    pub fn load(dir: &Path, metadata: &IndexMetadata) -> Result<Self, StorageError> {
        let path = dir.join(VECTORS_FILE);
        let corrupt = |reason: String| StorageError::Corrupt {
            path: path.clone(),
            reason,
        };

        if !path.exists() {
            return Err(corrupt("vector file is missing".to_string()));
        }

        let storage = MmapVectorStorage::open(&path).map_err(|e| match e {
            VectorError::VersionMismatch { .. } => StorageError::Incompatible {
                path: path.clone(),
                reason: e.to_string(),
            },
            other => corrupt(other.to_string()),
        })?;

        if storage.dimension().get() != metadata.dimension {
            return Err(corrupt(format!(
                "vector file holds {}-dimensional vectors, metadata says {}",
                storage.dimension().get(),
                metadata.dimension
            )));
        }
        if storage.vector_count() != metadata.entry_count {
            return Err(corrupt(format!(
                "vector file holds {} vectors, metadata says {}",
                storage.vector_count(),
                metadata.entry_count
            )));
        }

        let (ids, vectors): (Vec<VerseId>, Vec<Vec<f32>>) =
            storage.read_all_vectors().into_iter().unzip();

        let mut seen = HashSet::with_capacity(ids.len());
        if let Some(dup) = ids.iter().find(|id| !seen.insert(**id)) {
            return Err(corrupt(format!("verse id {dup} appears more than once")));
        }

        Ok(Self {
            dimension: storage.dimension(),
            model_name: metadata.model_name.clone(),
            ids,
            vectors,
        })
    }
}

impl VectorIndex for FlatIndex {
    fn backend(&self) -> BackendKind {
        BackendKind::Flat
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn accepts_text(&self) -> bool {
        false
    }

    fn add(&mut self, ids: &[VerseId], entries: IndexEntries<'_>) -> Result<(), VectorError> {
        let IndexEntries::Vectors(vectors) = entries else {
            return Err(VectorError::UnsupportedInput {
                backend: BackendKind::Flat.as_str(),
                input: entries.kind(),
            });
        };

        validate_new_ids(&self.ids, ids, vectors.len())?;
        for vector in vectors {
            self.dimension.validate_vector(vector)?;
        }

        self.ids.extend_from_slice(ids);
        self.vectors.extend(vectors.iter().cloned());
        Ok(())
    }

    fn query(&self, input: QueryInput<'_>, k: usize) -> Result<Vec<Neighbor>, VectorError> {
        let QueryInput::Vector(query) = input else {
            return Err(VectorError::UnsupportedInput {
                backend: BackendKind::Flat.as_str(),
                input: input.kind(),
            });
        };
        if k == 0 {
            return Err(VectorError::InvalidK(k));
        }
        self.dimension.validate_vector(query)?;

        let entries = self
            .ids
            .iter()
            .copied()
            .zip(self.vectors.iter().map(Vec::as_slice));
        Ok(nearest(query, entries, k))
    }

    fn persist(&self, dir: &Path) -> Result<(), StorageError> {
        let path = dir.join(VECTORS_FILE);
        let records: Vec<(VerseId, &[f32])> = self
            .ids
            .iter()
            .copied()
            .zip(self.vectors.iter().map(Vec::as_slice))
            .collect();

        MmapVectorStorage::write(&path, self.dimension, &records).map_err(|e| {
            StorageError::Write {
                path,
                source: match e {
                    VectorError::Storage(io) => io,
                    other => std::io::Error::other(other.to_string()),
                },
            }
        })
    }
}
