//! Offline index construction and publishing.

pub mod builder;

pub use builder::{BuildReport, CORPUS_FILE, IndexBuilder};
