//! Type-safe wrappers and core types for the vector index.
//!
//! Verse ids, dimensions and neighbors are newtypes so that positional ids,
//! distances and vector lengths cannot be mixed up at call sites.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Vector dimension of the default embedding model (all-MiniLM-L6-v2).
pub const VECTOR_DIMENSION_384: usize = 384;

/// Position of a verse in the corpus it was indexed from.
///
/// Unlike storage-level ids elsewhere, zero is valid: the first verse of a
/// corpus is `VerseId(0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerseId(u32);

impl VerseId {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Creates an id from a corpus position.
    ///
    /// Returns `None` if the position does not fit in 32 bits.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index).ok().map(Self)
    }

    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Returns the id as a corpus position.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }

    /// Converts to little-endian bytes for storage.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// Creates from little-endian bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }
}

impl std::fmt::Display for VerseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type-safe wrapper for vector dimensions.
///
/// Ensures runtime validation of vector dimensions to prevent mixing
/// vectors from different models in one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Creates a standard 384-dimensional vector dimension.
    #[must_use]
    pub const fn dimension_384() -> Self {
        Self(VECTOR_DIMENSION_384)
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl TryFrom<usize> for VectorDimension {
    type Error = VectorError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VectorDimension> for usize {
    fn from(value: VectorDimension) -> Self {
        value.0
    }
}

/// One k-NN hit: the verse id and its squared Euclidean distance to the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: VerseId,
    pub distance: f32,
}

impl Neighbor {
    #[must_use]
    pub const fn new(id: VerseId, distance: f32) -> Self {
        Self { id, distance }
    }
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error("Invalid neighbor count k={0}\nSuggestion: Request at least one result")]
    InvalidK(usize),

    #[error("Duplicate verse id {0}\nSuggestion: Every indexed verse needs a unique id")]
    DuplicateId(u32),

    #[error(
        "Verse ids must be contiguous from {expected}, got {actual}\nSuggestion: Assign ids by corpus position when building from scratch"
    )]
    NonContiguousIds { expected: u32, actual: u32 },

    #[error("Got {ids} ids for {entries} entries\nSuggestion: Pass exactly one id per entry")]
    LengthMismatch { ids: usize, entries: usize },

    #[error("The {backend} backend does not accept {input} input")]
    UnsupportedInput {
        backend: &'static str,
        input: &'static str,
    },

    #[error(
        "Embedding generation failed: {0}\nSuggestion: Verify the embedding model is properly initialized"
    )]
    EmbeddingFailed(String),

    #[error("Storage error: {0}\nSuggestion: Check disk space and file permissions")]
    Storage(#[from] std::io::Error),

    #[error(
        "Serialization error: {0}\nSuggestion: Check that index data is valid and not corrupted"
    )]
    Serialization(String),

    #[error("Invalid storage format: {0}\nSuggestion: Rebuild the index with `verse-search build`")]
    InvalidFormat(String),

    #[error(
        "Invalid storage version: expected {expected}, got {actual}\nSuggestion: Rebuild the index with this version of verse-search"
    )]
    VersionMismatch { expected: u32, actual: u32 },
}
