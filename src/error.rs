//! Error types shared across the build and query paths
//!
//! Module-local failures (corpus parsing, vector operations, encoding,
//! explanation calls) have their own enums next to the code that raises them.
//! This module holds the errors that cross module boundaries: persisted-index
//! storage, the offline build, service startup and per-request query errors.

use std::path::PathBuf;
use thiserror::Error;

use crate::corpus::CorpusError;
use crate::explain::ExplanationError;
use crate::vector::{EncodingError, VectorError};

/// Problems with a persisted index directory.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("No index found at '{path}'")]
    Missing { path: PathBuf },

    #[error("Index at '{path}' is corrupted: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Index at '{path}' is incompatible: {reason}")]
    Incompatible { path: PathBuf, reason: String },

    #[error("Failed to write index to '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Failures of the offline index build.
///
/// A build either publishes a complete index or leaves the previous one in
/// place; none of these leave a partial index behind.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error("Failed to encode corpus: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Failed to construct index: {0}")]
    Index(#[from] VectorError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Reasons the query service could not reach the ready state.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Failed to load corpus: {0}")]
    Corpus(#[from] CorpusError),

    #[error("Failed to load index: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to initialize embedding model: {0}")]
    Embedding(#[from] VectorError),
}

/// Per-request errors returned to the caller of the query service.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Invalid query: {reason}")]
    InvalidQuery { reason: String },

    #[error("Search service unavailable: {reason}")]
    ServiceUnavailable { reason: String },

    #[error("Verse {chapter}.{verse} not found")]
    VerseNotFound { chapter: u32, verse: u32 },

    #[error("Failed to encode query: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Index query failed: {0}")]
    Index(#[from] VectorError),

    #[error("Search task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Question answering is disabled: no explanation provider is configured")]
    AnswersDisabled,

    #[error("Question answering failed: {0}")]
    Answer(#[from] ExplanationError),
}

impl QueryError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::InvalidQuery { .. } => "INVALID_QUERY",
            Self::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            Self::VerseNotFound { .. } => "NOT_FOUND",
            Self::Encoding(_) => "ENCODING_ERROR",
            Self::Index(_) => "INDEX_ERROR",
            Self::Task(_) => "INTERNAL_ERROR",
            Self::AnswersDisabled => "ANSWERS_DISABLED",
            Self::Answer(_) => "ANSWER_FAILED",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::InvalidQuery { .. } => vec![
                "Provide a non-empty query",
                "Request at least one result with --top-k",
            ],
            Self::ServiceUnavailable { .. } => vec![
                "Run 'verse-search build' to create the index",
                "Check index_path and corpus_path in .verse-search/settings.toml",
            ],
            Self::VerseNotFound { .. } => vec![
                "Check the chapter and verse numbers",
                "Ensure the index was built from the full corpus",
            ],
            Self::Encoding(_) | Self::Index(_) => vec![
                "Run 'verse-search build' to rebuild the index with the configured model",
            ],
            Self::Task(_) => vec!["Retry the search; run with RUST_LOG=debug for details"],
            Self::AnswersDisabled => vec![
                "Set explanation.enabled = true in .verse-search/settings.toml",
            ],
            Self::Answer(_) => vec![
                "Check explanation.endpoint and that the API key variable is set",
                "Raise explanation.timeout_ms for slow endpoints",
            ],
        }
    }
}

/// Result type alias for build operations
pub type BuildResult<T> = Result<T, BuildError>;

/// Result type alias for query operations
pub type QueryResult<T> = Result<T, QueryError>;
