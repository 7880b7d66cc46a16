//! The vector index capability and the pieces its backends share.
//!
//! Two backends implement [`VectorIndex`]:
//! - [`FlatIndex`](crate::vector::FlatIndex) stores precomputed vectors and
//!   answers vector queries by exhaustive squared-L2 scan.
//! - [`ManagedIndex`](crate::vector::ManagedIndex) stores raw texts plus the
//!   embedding function and encodes on demand.
//!
//! Both rank by ascending squared Euclidean distance with ties broken by
//! ascending verse id, so callers see identical ordering rules whichever
//! backend is configured.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::corpus::Corpus;
use crate::error::StorageError;
use crate::vector::{
    EmbeddingGenerator, FlatIndex, IndexMetadata, ManagedIndex, Neighbor, VectorDimension,
    VectorError, VerseId,
};

/// Which index backend produced or serves an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Precomputed vectors, exact brute-force search.
    #[default]
    Flat,
    /// Raw texts encoded by the index itself.
    Managed,
}

impl BackendKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Managed => "managed",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flat" => Ok(Self::Flat),
            "managed" => Ok(Self::Managed),
            other => Err(format!("unknown backend '{other}', expected flat or managed")),
        }
    }
}

/// Payload handed to [`VectorIndex::add`].
#[derive(Debug, Clone, Copy)]
pub enum IndexEntries<'a> {
    Vectors(&'a [Vec<f32>]),
    Texts(&'a [String]),
}

impl IndexEntries<'_> {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Vectors(v) => v.len(),
            Self::Texts(t) => t.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) const fn kind(&self) -> &'static str {
        match self {
            Self::Vectors(_) => "vector",
            Self::Texts(_) => "text",
        }
    }
}

/// Query payload handed to [`VectorIndex::query`].
#[derive(Debug, Clone, Copy)]
pub enum QueryInput<'a> {
    Vector(&'a [f32]),
    Text(&'a str),
}

impl QueryInput<'_> {
    pub(crate) const fn kind(&self) -> &'static str {
        match self {
            Self::Vector(_) => "vector",
            Self::Text(_) => "text",
        }
    }
}

/// k-nearest-neighbor index keyed by verse id.
///
/// Implementations are immutable once built as far as queries are
/// concerned: `query` takes `&self` and is safe to call from many threads.
pub trait VectorIndex: Send + Sync + std::fmt::Debug {
    fn backend(&self) -> BackendKind;

    /// Number of stored entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimension(&self) -> VectorDimension;

    /// Embedding model the stored (or lazily computed) vectors come from.
    fn model_name(&self) -> &str;

    /// Whether [`query`](Self::query) accepts raw text.
    ///
    /// Callers holding only text must encode it first when this is `false`.
    fn accepts_text(&self) -> bool;

    /// Appends entries.
    ///
    /// Ids must be unique; when the index is empty they must be exactly
    /// `0..n` in order.
    fn add(&mut self, ids: &[VerseId], entries: IndexEntries<'_>) -> Result<(), VectorError>;

    /// Returns the `min(k, len)` nearest entries, nearest first.
    ///
    /// `k == 0` is rejected with [`VectorError::InvalidK`].
    fn query(&self, input: QueryInput<'_>, k: usize) -> Result<Vec<Neighbor>, VectorError>;

    /// Writes the backend's data files into `dir`.
    fn persist(&self, dir: &Path) -> Result<(), StorageError>;
}

/// Squared Euclidean distance.
#[must_use]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Exhaustively scores `query` against `entries` and keeps the `k` nearest.
///
/// Ordering is ascending distance, then ascending id.
pub(crate) fn nearest<'a>(
    query: &[f32],
    entries: impl Iterator<Item = (VerseId, &'a [f32])>,
    k: usize,
) -> Vec<Neighbor> {
    let mut scored: Vec<Neighbor> = entries
        .map(|(id, vector)| Neighbor::new(id, squared_l2(query, vector)))
        .collect();

    let by_rank = |a: &Neighbor, b: &Neighbor| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.id.cmp(&b.id))
    };

    if k < scored.len() {
        scored.select_nth_unstable_by(k, by_rank);
        scored.truncate(k);
    }
    scored.sort_unstable_by(by_rank);
    scored
}

/// Validates ids for an append to an index currently holding `existing`.
pub(crate) fn validate_new_ids(
    existing: &[VerseId],
    ids: &[VerseId],
    entries: usize,
) -> Result<(), VectorError> {
    if ids.len() != entries {
        return Err(VectorError::LengthMismatch {
            ids: ids.len(),
            entries,
        });
    }

    if existing.is_empty() {
        for (position, id) in ids.iter().enumerate() {
            let expected = VerseId::from_index(position).ok_or_else(|| {
                VectorError::InvalidFormat("Too many entries for 32-bit verse ids".into())
            })?;
            if *id != expected {
                return Err(VectorError::NonContiguousIds {
                    expected: expected.get(),
                    actual: id.get(),
                });
            }
        }
        return Ok(());
    }

    let mut seen: HashSet<VerseId> = existing.iter().copied().collect();
    for id in ids {
        if !seen.insert(*id) {
            return Err(VectorError::DuplicateId(id.get()));
        }
    }
    Ok(())
}

/// Persists `index` into `dir` together with its metadata.
///
/// The corpus is fingerprinted so a later load can detect that it is being
/// paired with a different corpus.
pub fn persist_index(
    index: &dyn VectorIndex,
    dir: &Path,
    corpus: &Corpus,
) -> Result<IndexMetadata, StorageError> {
    std::fs::create_dir_all(dir).map_err(|source| StorageError::Write {
        path: dir.to_path_buf(),
        source,
    })?;

    index.persist(dir)?;

    let metadata = IndexMetadata::new(
        index.backend(),
        index.model_name().to_string(),
        index.dimension().get(),
        index.len(),
        corpus.len(),
        corpus.checksum(),
    );
    metadata.save(dir)?;
    Ok(metadata)
}

/// Loads the index persisted in `dir`.
///
/// Fails with [`StorageError`] when the directory or its files are missing
/// or corrupt, when the index was produced by a different backend than
/// `expected_backend`, or when `generator` is not the model that built it.
pub fn load_index(
    dir: &Path,
    expected_backend: BackendKind,
    generator: Arc<dyn EmbeddingGenerator>,
) -> Result<(Box<dyn VectorIndex>, IndexMetadata), StorageError> {
    let metadata = IndexMetadata::load(dir)?;

    let incompatible = |reason: String| StorageError::Incompatible {
        path: dir.to_path_buf(),
        reason,
    };

    if metadata.backend != expected_backend {
        return Err(incompatible(format!(
            "built with the {} backend, configured backend is {}",
            metadata.backend, expected_backend
        )));
    }
    if metadata.model_name != generator.model_name() {
        return Err(incompatible(format!(
            "built with model {}, configured model is {}",
            metadata.model_name,
            generator.model_name()
        )));
    }
    if metadata.dimension != generator.dimension().get() {
        return Err(incompatible(format!(
            "built with {}-dimensional vectors, model produces {}",
            metadata.dimension,
            generator.dimension().get()
        )));
    }

    let index: Box<dyn VectorIndex> = match metadata.backend {
        BackendKind::Flat => Box::new(FlatIndex::load(dir, &metadata)?),
        BackendKind::Managed => Box::new(ManagedIndex::load(dir, &metadata, generator)?),
    };

    tracing::debug!(
        path = %dir.display(),
        backend = %metadata.backend,
        model = %metadata.model_name,
        entries = index.len(),
        "loaded index"
    );

    Ok((index, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(range: std::ops::Range<u32>) -> Vec<VerseId> {
        range.map(VerseId::new).collect()
    }

    #[test]
    fn test_squared_l2() {
        assert_eq!(squared_l2(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(squared_l2(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_nearest_orders_by_distance_then_id() {
        let vectors = [vec![2.0], vec![1.0], vec![1.0], vec![0.0]];
        let entries = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (VerseId::new(i as u32), v.as_slice()));

        let result = nearest(&[1.0], entries, 3);
        let got: Vec<u32> = result.iter().map(|n| n.id.get()).collect();
        assert_eq!(got, vec![1, 2, 0]);
        assert_eq!(result[0].distance, 0.0);
        assert_eq!(result[2].distance, 1.0);
    }

    #[test]
    fn test_nearest_k_larger_than_entries() {
        let vectors = [vec![0.0], vec![5.0]];
        let entries = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (VerseId::new(i as u32), v.as_slice()));
        assert_eq!(nearest(&[4.0], entries, 10).len(), 2);
    }

    #[test]
    fn test_validate_new_ids_from_scratch() {
        assert!(validate_new_ids(&[], &ids(0..3), 3).is_ok());
        assert!(matches!(
            validate_new_ids(&[], &[VerseId::new(1), VerseId::new(2)], 2),
            Err(VectorError::NonContiguousIds {
                expected: 0,
                actual: 1
            })
        ));
        assert!(matches!(
            validate_new_ids(&[], &ids(0..2), 3),
            Err(VectorError::LengthMismatch { ids: 2, entries: 3 })
        ));
    }

    #[test]
    fn test_validate_new_ids_append() {
        let existing = ids(0..3);
        assert!(validate_new_ids(&existing, &ids(3..5), 2).is_ok());
        assert!(matches!(
            validate_new_ids(&existing, &[VerseId::new(2)], 1),
            Err(VectorError::DuplicateId(2))
        ));
        assert!(matches!(
            validate_new_ids(&existing, &[VerseId::new(7), VerseId::new(7)], 2),
            Err(VectorError::DuplicateId(7))
        ));
    }

    #[test]
    fn test_backend_kind_parsing() {
        assert_eq!("flat".parse::<BackendKind>().unwrap(), BackendKind::Flat);
        assert_eq!("Managed".parse::<BackendKind>().unwrap(), BackendKind::Managed);
        assert!("faiss".parse::<BackendKind>().is_err());
        assert_eq!(
            serde_json::to_string(&BackendKind::Managed).unwrap(),
            "\"managed\""
        );
    }
}
