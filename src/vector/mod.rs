//! Vector search over verse embeddings.
//!
//! This module provides the embedding encoders, the [`VectorIndex`]
//! capability with its flat and managed backends, and the on-disk formats
//! both backends persist to.
//!
//! # Architecture
//! The flat backend keeps precomputed vectors and scans them exhaustively;
//! its vectors are stored in a memory-mapped file for fast loading. The
//! managed backend keeps raw texts and owns the encoder, so callers may
//! query it with text directly.

mod embedding;
mod flat;
mod index;
mod managed;
mod metadata;
mod storage;
mod types;

// Re-export core types for public API
#[cfg(test)]
pub use embedding::MockEmbeddingGenerator;
pub use embedding::{
    EmbeddingGenerator, EncodingError, FastEmbedGenerator, HASHING_MODEL_PREFIX,
    HashingEmbeddingGenerator, create_embedding_generator, model_to_string, parse_embedding_model,
};
pub use flat::{FlatIndex, VECTORS_FILE};
pub use index::{
    BackendKind, IndexEntries, QueryInput, VectorIndex, load_index, persist_index, squared_l2,
};
pub use managed::{ManagedIndex, TEXTS_FILE};
pub use metadata::{IndexMetadata, METADATA_FILE};
pub use storage::MmapVectorStorage;
pub use types::{Neighbor, VECTOR_DIMENSION_384, VectorDimension, VectorError, VerseId};
