//! Builds an index from a corpus and publishes it atomically.
//!
//! Publishing writes every file into a staging directory next to the
//! destination and then swaps it in with renames:
//!
//! 1. the current index (if any) is renamed to a backup path,
//! 2. the staging directory is renamed to the destination,
//! 3. the backup is removed.
//!
//! A failure before step 2 drops the staging directory and leaves the
//! previous index in place. A failure of step 2 itself renames the backup
//! back.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::corpus::Corpus;
use crate::error::{BuildResult, StorageError};
use crate::vector::{
    BackendKind, EmbeddingGenerator, FlatIndex, IndexEntries, IndexMetadata, ManagedIndex,
    VectorError, VectorIndex, VerseId, persist_index,
};

/// Snapshot of the corpus stored inside every published index.
pub const CORPUS_FILE: &str = "corpus.json";

const DEFAULT_BATCH_SIZE: usize = 64;

/// Summary of a completed build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub verses: usize,
    pub backend: BackendKind,
    pub model_name: String,
    pub dimension: usize,
    pub path: PathBuf,
    pub elapsed: Duration,
}

impl BuildReport {
    /// Display the report in a human-readable format
    pub fn display(&self) {
        println!("\nIndex build complete:");
        println!("  Verses indexed: {}", self.verses);
        println!("  Backend: {}", self.backend);
        println!("  Model: {} ({} dimensions)", self.model_name, self.dimension);
        println!("  Location: {}", self.path.display());
        println!("  Time elapsed: {:.2}s", self.elapsed.as_secs_f64());
    }
}

/// Offline index builder.
pub struct IndexBuilder {
    generator: Arc<dyn EmbeddingGenerator>,
    backend: BackendKind,
    batch_size: usize,
}

impl IndexBuilder {
    pub fn new(generator: Arc<dyn EmbeddingGenerator>, backend: BackendKind) -> Self {
        Self {
            generator,
            backend,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Texts per encoder call for the flat backend.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Builds an in-memory index over `corpus`; verse id `i` is record `i`.
    pub fn build(&self, corpus: &Corpus) -> BuildResult<Box<dyn VectorIndex>> {
        let count = u32::try_from(corpus.len()).map_err(|_| {
            VectorError::InvalidFormat(format!(
                "Corpus of {} verses exceeds the 32-bit verse id space",
                corpus.len()
            ))
        })?;
        let ids: Vec<VerseId> = (0..count).map(VerseId::new).collect();

        let index: Box<dyn VectorIndex> = match self.backend {
            BackendKind::Flat => {
                let vectors = self
                    .generator
                    .encode_batch(&corpus.texts(), self.batch_size)?;
                let mut index =
                    FlatIndex::new(self.generator.dimension(), self.generator.model_name());
                index.add(&ids, IndexEntries::Vectors(&vectors))?;
                Box::new(index)
            }
            BackendKind::Managed => {
                let texts: Vec<String> = corpus.iter().map(|v| v.text.clone()).collect();
                let mut index = ManagedIndex::new(Arc::clone(&self.generator));
                index.add(&ids, IndexEntries::Texts(&texts))?;
                Box::new(index)
            }
        };

        tracing::debug!(
            backend = %self.backend,
            entries = index.len(),
            "built index in memory"
        );
        Ok(index)
    }

    /// Writes `index` and a snapshot of `corpus` to `dest`, replacing any
    /// index already there.
    pub fn publish(
        &self,
        corpus: &Corpus,
        index: &dyn VectorIndex,
        dest: &Path,
    ) -> BuildResult<IndexMetadata> {
        let parent = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(|source| StorageError::Write {
            path: parent.clone(),
            source,
        })?;

        // Removed on drop, so every early return below cleans up after itself.
        let staging = tempfile::Builder::new()
            .prefix(".index-staging-")
            .tempdir_in(&parent)
            .map_err(|source| StorageError::Write {
                path: parent.clone(),
                source,
            })?;

        let metadata = persist_index(index, staging.path(), corpus)?;
        corpus.save(&staging.path().join(CORPUS_FILE))?;

        swap_into_place(staging.path(), dest, &parent)?;

        tracing::info!(
            path = %dest.display(),
            backend = %metadata.backend,
            entries = metadata.entry_count,
            "published index"
        );
        Ok(metadata)
    }

    /// Loads the corpus at `corpus_path`, builds and publishes to `dest`.
    pub fn run(&self, corpus_path: &Path, dest: &Path) -> BuildResult<BuildReport> {
        let start = Instant::now();

        let corpus = Corpus::load(corpus_path)?;
        tracing::info!(
            corpus = %corpus_path.display(),
            verses = corpus.len(),
            backend = %self.backend,
            model = self.generator.model_name(),
            "building index"
        );

        let index = self.build(&corpus)?;
        let metadata = self.publish(&corpus, index.as_ref(), dest)?;

        Ok(BuildReport {
            verses: corpus.len(),
            backend: metadata.backend,
            model_name: metadata.model_name,
            dimension: metadata.dimension,
            path: dest.to_path_buf(),
            elapsed: start.elapsed(),
        })
    }
}

fn swap_into_place(staged: &Path, dest: &Path, parent: &Path) -> Result<(), StorageError> {
    let write_error = |path: &Path, source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };

    let backup = if dest.exists() {
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index".to_string());
        let backup = parent.join(format!(".{name}.backup-{}", std::process::id()));
        if backup.exists() {
            std::fs::remove_dir_all(&backup).map_err(|e| write_error(&backup, e))?;
        }
        std::fs::rename(dest, &backup).map_err(|e| write_error(dest, e))?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = std::fs::rename(staged, dest) {
        if let Some(backup) = &backup {
            if let Err(restore) = std::fs::rename(backup, dest) {
                tracing::error!(
                    backup = %backup.display(),
                    error = %restore,
                    "failed to restore previous index"
                );
            }
        }
        return Err(write_error(dest, e));
    }

    if let Some(backup) = backup {
        if let Err(e) = std::fs::remove_dir_all(&backup) {
            tracing::warn!(backup = %backup.display(), error = %e, "failed to remove old index");
        }
    }
    Ok(())
}
