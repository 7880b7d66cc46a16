//! Embedding generation for verse texts and queries.
//!
//! This module provides the trait and implementations for turning text into
//! fixed-dimension vectors. `FastEmbedGenerator` wraps a fastembed model
//! (AllMiniLML6V2 by default, the model the corpus was originally indexed
//! with); `HashingEmbeddingGenerator` is a deterministic, offline encoder used
//! by tests and air-gapped builds.
//!
//! Every generator reports a model name. The name is persisted next to the
//! index so that vectors produced by different models are never compared.

use std::path::Path;
use std::sync::{Arc, Mutex};

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::EmbeddingConfig;
use crate::vector::{VectorDimension, VectorError};

/// Prefix of the model names handled by [`HashingEmbeddingGenerator`].
pub const HASHING_MODEL_PREFIX: &str = "hashing-";

/// Violations of the encoder's batch contract.
#[derive(Error, Debug)]
pub enum EncodingError {
    #[error(
        "Encoder returned {actual} embeddings for {expected} texts\nSuggestion: The embedding model may be misconfigured"
    )]
    CountMismatch { expected: usize, actual: usize },

    #[error(
        "Encoder returned a {actual}-dimensional vector for text #{position}, expected {expected}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch {
        position: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid batch size 0\nSuggestion: Set embedding.batch_size to at least 1")]
    InvalidBatchSize,

    #[error(transparent)]
    Generator(#[from] VectorError),
}

/// Trait for generating embeddings from text.
///
/// Implementations must be thread-safe and deterministic for a fixed model
/// version.
pub trait EmbeddingGenerator: Send + Sync {
    /// Generate embeddings for multiple texts, one per input, in input order.
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError>;

    /// Get the dimension of embeddings produced by this generator.
    #[must_use]
    fn dimension(&self) -> VectorDimension;

    /// Identifier of the model, recorded alongside persisted indexes.
    fn model_name(&self) -> &str;

    /// Encodes `texts` in chunks of `batch_size`, checking the shape contract.
    ///
    /// The result has exactly one vector per input text, each of
    /// [`dimension`](Self::dimension) length.
    fn encode_batch(
        &self,
        texts: &[&str],
        batch_size: usize,
    ) -> Result<Vec<Vec<f32>>, EncodingError> {
        if batch_size == 0 {
            return Err(EncodingError::InvalidBatchSize);
        }

        let expected_dim = self.dimension().get();
        let mut embeddings = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(batch_size) {
            let batch = self.generate_embeddings(chunk)?;
            if batch.len() != chunk.len() {
                return Err(EncodingError::CountMismatch {
                    expected: chunk.len(),
                    actual: batch.len(),
                });
            }
            for embedding in batch {
                if embedding.len() != expected_dim {
                    return Err(EncodingError::DimensionMismatch {
                        position: embeddings.len(),
                        expected: expected_dim,
                        actual: embedding.len(),
                    });
                }
                embeddings.push(embedding);
            }
        }

        Ok(embeddings)
    }

    /// Encodes a single text.
    fn encode(&self, text: &str) -> Result<Vec<f32>, EncodingError> {
        let mut embeddings = self.encode_batch(&[text], 1)?;
        embeddings.pop().ok_or(EncodingError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }
}

/// FastEmbed implementation.
///
/// The model handle needs `&mut` access to embed, so it lives behind a mutex;
/// concurrent callers serialize on it.
pub struct FastEmbedGenerator {
    model: Mutex<TextEmbedding>,
    dimension: VectorDimension,
    model_name: String,
}

impl std::fmt::Debug for FastEmbedGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedGenerator")
            .field("model", &self.model_name)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl FastEmbedGenerator {
    /// Create a generator for `model`, caching downloaded weights in `cache_dir`.
    ///
    /// The dimension is discovered by embedding a probe string.
    ///
    /// # Errors
    /// Returns an error if the model fails to initialize or download.
    pub fn with_model(
        model: EmbeddingModel,
        cache_dir: &Path,
        show_download_progress: bool,
    ) -> Result<Self, VectorError> {
        let model_name = model_to_string(&model);

        let mut text_model = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir.to_path_buf())
                .with_show_download_progress(show_download_progress),
        )
        .map_err(|e| VectorError::EmbeddingFailed(
            format!("Failed to initialize embedding model {model_name}: {e}. Ensure you have internet connection for first-time model download")
        ))?;

        let probe = text_model
            .embed(vec!["probe"], None)
            .map_err(|e| VectorError::EmbeddingFailed(format!("Model probe failed: {e}")))?;
        let dimension = probe
            .first()
            .map(Vec::len)
            .ok_or_else(|| VectorError::EmbeddingFailed("Model returned no probe vector".into()))
            .and_then(VectorDimension::new)?;

        tracing::debug!(model = %model_name, dimension = dimension.get(), "embedding model ready");

        Ok(Self {
            model: Mutex::new(text_model),
            dimension,
            model_name,
        })
    }
}

impl EmbeddingGenerator for FastEmbedGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self
            .model
            .lock()
            .map_err(|_| {
                VectorError::EmbeddingFailed(
                    "Failed to acquire embedding model lock - model may be poisoned".to_string(),
                )
            })?
            .embed(texts.to_vec(), None)
            .map_err(|e| {
                VectorError::EmbeddingFailed(format!("Failed to generate embeddings: {e}"))
            })?;

        for embedding in &embeddings {
            self.dimension.validate_vector(embedding)?;
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Deterministic feature-hashing bag-of-words encoder.
///
/// Lowercased alphanumeric tokens are hashed with SHA-256 into `dimension`
/// signed buckets and the result is L2-normalized. Identical texts always map
/// to identical vectors; texts sharing words land close together.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingGenerator {
    dimension: VectorDimension,
    model_name: String,
}

impl HashingEmbeddingGenerator {
    #[must_use]
    pub fn new(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            model_name: format!("{HASHING_MODEL_PREFIX}{}", dimension.get()),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let dim = self.dimension.get();
        let mut embedding = vec![0.0f32; dim];

        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % dim as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for val in &mut embedding {
                *val /= magnitude;
            }
        }
        embedding
    }
}

impl EmbeddingGenerator for HashingEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// Builds the generator named by `config.model`.
///
/// `hashing-<dim>` selects [`HashingEmbeddingGenerator`]; anything else is
/// resolved as a fastembed model name.
pub fn create_embedding_generator(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingGenerator>, VectorError> {
    if let Some(dim) = config.model.strip_prefix(HASHING_MODEL_PREFIX) {
        let dim: usize = dim.parse().map_err(|_| {
            VectorError::EmbeddingFailed(format!(
                "Invalid hashing model '{}': expected hashing-<dimension>",
                config.model
            ))
        })?;
        return Ok(Arc::new(HashingEmbeddingGenerator::new(
            VectorDimension::new(dim)?,
        )));
    }

    let model = parse_embedding_model(&config.model)?;
    let generator =
        FastEmbedGenerator::with_model(model, &config.cache_dir, config.show_download_progress)?;
    Ok(Arc::new(generator))
}

/// Resolves a configured model name to a fastembed model.
pub fn parse_embedding_model(name: &str) -> Result<EmbeddingModel, VectorError> {
    match name {
        "AllMiniLML6V2" | "all-MiniLM-L6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "AllMiniLML12V2" | "all-MiniLM-L12-v2" => Ok(EmbeddingModel::AllMiniLML12V2),
        "BGESmallENV15" | "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "BGEBaseENV15" | "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "NomicEmbedTextV15" | "nomic-embed-text-v1.5" => Ok(EmbeddingModel::NomicEmbedTextV15),
        other => Err(VectorError::EmbeddingFailed(format!(
            "Unknown embedding model '{other}'. Supported: AllMiniLML6V2, AllMiniLML12V2, BGESmallENV15, BGEBaseENV15, NomicEmbedTextV15, hashing-<dim>"
        ))),
    }
}

/// Canonical name recorded in index metadata for a fastembed model.
#[must_use]
pub fn model_to_string(model: &EmbeddingModel) -> String {
    format!("{model:?}")
}

/// Mock embedding generator for testing the batch contract.
///
/// Produces one-hot vectors keyed by text length and can be told to drop
/// results or return vectors of the wrong length.
#[cfg(test)]
pub struct MockEmbeddingGenerator {
    dimension: VectorDimension,
    pub drop_last: bool,
    pub short_vectors: bool,
}

#[cfg(test)]
impl MockEmbeddingGenerator {
    pub fn new(dim: usize) -> Self {
        Self {
            dimension: VectorDimension::new(dim).unwrap(),
            drop_last: false,
            short_vectors: false,
        }
    }
}

#[cfg(test)]
impl EmbeddingGenerator for MockEmbeddingGenerator {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        let dim = self.dimension.get();
        let len = if self.short_vectors { dim - 1 } else { dim };
        let mut embeddings: Vec<Vec<f32>> = texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0; len];
                if len > 0 {
                    v[text.len() % len] = 1.0;
                }
                v
            })
            .collect();
        if self.drop_last {
            embeddings.pop();
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}
