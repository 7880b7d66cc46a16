/// The main library module for verse-search
pub mod config;
pub mod corpus;
pub mod display;
pub mod error;
pub mod explain;
pub mod indexing;
pub mod io;
pub mod logging;
pub mod search;
pub mod vector;

// Explicit exports for better API clarity
pub use config::Settings;
pub use corpus::{Corpus, CorpusError, Verse};
pub use error::{BuildError, BuildResult, QueryError, QueryResult, StartupError, StorageError};
pub use explain::{Answer, ExplanationError, ExplanationProvider, OpenAiCompatibleProvider};
pub use indexing::{BuildReport, IndexBuilder};
pub use search::{
    AnswerResponse, QueryService, ResultRecord, SearchResponse, ServiceState, ServiceStatus,
};
pub use vector::{
    BackendKind, EmbeddingGenerator, FlatIndex, HashingEmbeddingGenerator, ManagedIndex, Neighbor,
    VectorIndex, VerseId,
};
