//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success - operation completed, results found
//! - `1`: General error - unspecified failure
//! - `2`: Service unavailable - no usable index, automation should halt
//! - `3-125`: Specific recoverable errors
//! - `126-255`: Reserved by shell

use crate::corpus::CorpusError;
use crate::error::{BuildError, QueryError, StartupError, StorageError};

/// Standard exit codes for CLI operations.
///
/// These codes follow Unix conventions where 0 indicates success,
/// and non-zero values indicate various error conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// No index could be loaded (code 2)
    ServiceUnavailable = 2,

    /// No results, or the requested verse does not exist (code 3)
    NotFound = 3,

    /// Query was empty or asked for zero results (code 4)
    InvalidQuery = 4,

    /// File I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,

    /// Index corruption or incompatibility detected (code 7)
    IndexCorrupted = 7,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

impl ExitCode {
    /// Exit code for a result list: `Success` if non-empty, `NotFound` if empty.
    pub fn from_results<T>(results: &[T]) -> Self {
        if results.is_empty() {
            ExitCode::NotFound
        } else {
            ExitCode::Success
        }
    }

    /// Convert a `QueryError` to the appropriate exit code.
    ///
    /// Maps specific error types to semantic exit codes that scripts
    /// can use to determine appropriate recovery actions.
    pub fn from_error(error: &QueryError) -> Self {
        match error {
            QueryError::InvalidQuery { .. } => ExitCode::InvalidQuery,
            QueryError::ServiceUnavailable { .. } => ExitCode::ServiceUnavailable,
            QueryError::VerseNotFound { .. } => ExitCode::NotFound,
            QueryError::AnswersDisabled => ExitCode::ConfigError,
            QueryError::Encoding(_)
            | QueryError::Index(_)
            | QueryError::Task(_)
            | QueryError::Answer(_) => ExitCode::GeneralError,
        }
    }

    pub fn from_build_error(error: &BuildError) -> Self {
        match error {
            BuildError::Corpus(e) => Self::from_corpus_error(e),
            BuildError::Storage(e) => Self::from_storage_error(e),
            BuildError::Encoding(_) | BuildError::Index(_) => ExitCode::GeneralError,
        }
    }

    pub fn from_startup_error(error: &StartupError) -> Self {
        match error {
            StartupError::Corpus(e) => Self::from_corpus_error(e),
            StartupError::Storage(e) => Self::from_storage_error(e),
            StartupError::Embedding(_) => ExitCode::ConfigError,
        }
    }

    pub fn from_storage_error(error: &StorageError) -> Self {
        match error {
            StorageError::Missing { .. } => ExitCode::ServiceUnavailable,
            StorageError::Corrupt { .. } | StorageError::Incompatible { .. } => {
                ExitCode::IndexCorrupted
            }
            StorageError::Write { .. } => ExitCode::IoError,
        }
    }

    fn from_corpus_error(error: &CorpusError) -> Self {
        match error {
            CorpusError::NotFound { .. } | CorpusError::Read { .. } | CorpusError::Write { .. } => {
                ExitCode::IoError
            }
            CorpusError::Parse { .. } | CorpusError::Validation { .. } => ExitCode::GeneralError,
        }
    }

    /// Check if this exit code indicates a blocking error.
    ///
    /// Blocking errors should halt automation pipelines.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, ExitCode::ServiceUnavailable | ExitCode::IndexCorrupted)
    }

    /// Check if this exit code indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }
}
