//! The query service: validates queries, runs them against the index, joins
//! the results with the corpus and optionally attaches explanations. With a
//! provider attached it also answers questions from retrieved verses.
//!
//! The service is either ready (corpus, index and encoder loaded) or
//! uninitialized. An uninitialized service still answers every call, with
//! [`QueryError::ServiceUnavailable`] carrying the reason the load failed.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::{ExplanationConfig, Settings};
use crate::corpus::{Corpus, CorpusError};
use crate::error::{QueryError, QueryResult, StartupError, StorageError};
use crate::explain::{DEFAULT_PLACEHOLDER, ExplanationError, ExplanationProvider};
use crate::indexing::CORPUS_FILE;
use crate::vector::{
    BackendKind, EmbeddingGenerator, IndexMetadata, Neighbor, QueryInput, VectorIndex, VerseId,
    create_embedding_generator, load_index,
};

/// One search match, joined with its verse.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRecord {
    /// 1-based position in the returned list
    pub rank: usize,
    pub chapter: u32,
    pub verse: u32,
    pub text: String,
    /// The verse's word meanings
    pub interpretation: String,
    /// Squared L2 distance to the query; smaller is closer
    pub distance: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_explanation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub matches: Vec<ResultRecord>,
}

/// An answer to a question, with the verses it was drawn from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnswerResponse {
    pub question: String,
    pub answer: String,
    pub score: f32,
    /// Verses used as context; empty when the caller supplied the context
    pub sources: Vec<ResultRecord>,
}

/// A verse fetched directly by chapter and verse number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerseRecord {
    pub verse_id: VerseId,
    pub chapter: u32,
    pub verse: u32,
    pub text: String,
    pub interpretation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Uninitialized,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    /// Why the service is not ready
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
    pub entries: usize,
    pub corpus_len: usize,
    /// Unix timestamp of the index build, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub built_at: Option<i64>,
    pub explanations: bool,
}

/// How explanations are fanned out per search.
#[derive(Debug, Clone)]
pub struct EnrichmentOptions {
    pub timeout: Duration,
    pub max_concurrency: usize,
    pub placeholder: String,
}

impl Default for EnrichmentOptions {
    fn default() -> Self {
        Self::from_config(&ExplanationConfig::default())
    }
}

impl EnrichmentOptions {
    pub fn from_config(config: &ExplanationConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            max_concurrency: config.max_concurrency.max(1),
            placeholder: if config.placeholder.is_empty() {
                DEFAULT_PLACEHOLDER.to_string()
            } else {
                config.placeholder.clone()
            },
        }
    }
}

struct Ready {
    corpus: Arc<Corpus>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn EmbeddingGenerator>,
    metadata: Option<IndexMetadata>,
}

enum State {
    Uninitialized {
        reason: String,
        cause: Option<StartupError>,
    },
    Ready(Arc<Ready>),
}

pub struct QueryService {
    state: State,
    explainer: Option<Arc<dyn ExplanationProvider>>,
    options: EnrichmentOptions,
}

impl std::fmt::Debug for QueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryService")
            .field("ready", &matches!(self.state, State::Ready(_)))
            .field("explainer", &self.explainer.is_some())
            .finish_non_exhaustive()
    }
}

impl QueryService {
    /// A ready service over already-loaded parts.
    pub fn new_ready(
        corpus: Corpus,
        index: Box<dyn VectorIndex>,
        generator: Arc<dyn EmbeddingGenerator>,
    ) -> Self {
        Self::from_parts(corpus, index, generator, None)
    }

    fn from_parts(
        corpus: Corpus,
        index: Box<dyn VectorIndex>,
        generator: Arc<dyn EmbeddingGenerator>,
        metadata: Option<IndexMetadata>,
    ) -> Self {
        Self {
            state: State::Ready(Arc::new(Ready {
                corpus: Arc::new(corpus),
                index: Arc::from(index),
                generator,
                metadata,
            })),
            explainer: None,
            options: EnrichmentOptions::default(),
        }
    }

    /// A service that failed to load; every search reports `reason`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            state: State::Uninitialized {
                reason: reason.into(),
                cause: None,
            },
            explainer: None,
            options: EnrichmentOptions::default(),
        }
    }

    /// Attaches an explanation provider used by [`search`](Self::search).
    #[must_use]
    pub fn with_explainer(
        mut self,
        explainer: Option<Arc<dyn ExplanationProvider>>,
        options: EnrichmentOptions,
    ) -> Self {
        self.explainer = explainer;
        self.options = options;
        self
    }

    /// Loads the index in `index_dir` and the corpus at `corpus_path`.
    ///
    /// When `corpus_path` does not exist the corpus snapshot stored with the
    /// index is used instead.
    pub fn open(
        index_dir: &Path,
        corpus_path: &Path,
        backend: BackendKind,
        generator: Arc<dyn EmbeddingGenerator>,
    ) -> Result<Self, StartupError> {
        let corpus = match Corpus::load(corpus_path) {
            Ok(corpus) => corpus,
            Err(CorpusError::NotFound { .. }) if index_dir.join(CORPUS_FILE).exists() => {
                tracing::debug!(
                    corpus = %corpus_path.display(),
                    "corpus file not found, using the snapshot stored with the index"
                );
                Corpus::load(&index_dir.join(CORPUS_FILE))?
            }
            Err(e) => return Err(e.into()),
        };

        let (index, metadata) = load_index(index_dir, backend, Arc::clone(&generator))?;

        if metadata.corpus_len != corpus.len() || metadata.corpus_checksum != corpus.checksum() {
            tracing::warn!(
                index_corpus_len = metadata.corpus_len,
                corpus_len = corpus.len(),
                "corpus differs from the one the index was built from; rebuild the index to resync"
            );
        }

        tracing::info!(
            path = %index_dir.display(),
            backend = %metadata.backend,
            model = %metadata.model_name,
            entries = index.len(),
            verses = corpus.len(),
            "query service ready"
        );

        Ok(Self::from_parts(corpus, index, generator, Some(metadata)))
    }

    /// Builds the service described by `settings`.
    ///
    /// Never fails: a load failure is logged and yields an uninitialized
    /// service that reports it on every request.
    pub fn from_settings(settings: &Settings) -> Self {
        let explainer = crate::explain::create_provider(&settings.explanation);
        let options = EnrichmentOptions::from_config(&settings.explanation);

        let service = match Self::try_from_settings(settings) {
            Ok(service) => service,
            Err(e) => {
                tracing::error!(error = %e, "query service failed to start");
                Self {
                    state: State::Uninitialized {
                        reason: e.to_string(),
                        cause: Some(e),
                    },
                    explainer: None,
                    options: EnrichmentOptions::default(),
                }
            }
        };
        service.with_explainer(explainer, options)
    }

    fn try_from_settings(settings: &Settings) -> Result<Self, StartupError> {
        let index_dir = settings.index_dir();
        // Fail before paying for model initialization
        if !IndexMetadata::exists(&index_dir) {
            return Err(StorageError::Missing { path: index_dir }.into());
        }

        let generator = create_embedding_generator(&settings.embedding)?;
        Self::open(
            &index_dir,
            &settings.corpus_file(),
            settings.index.backend,
            generator,
        )
    }

    pub fn state(&self) -> ServiceState {
        match self.state {
            State::Uninitialized { .. } => ServiceState::Uninitialized,
            State::Ready(_) => ServiceState::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    /// The load failure behind an uninitialized service, when it came from
    /// [`from_settings`](Self::from_settings).
    pub fn startup_error(&self) -> Option<&StartupError> {
        match &self.state {
            State::Uninitialized { cause, .. } => cause.as_ref(),
            State::Ready(_) => None,
        }
    }

    fn ready(&self) -> QueryResult<&Arc<Ready>> {
        match &self.state {
            State::Ready(ready) => Ok(ready),
            State::Uninitialized { reason, .. } => Err(QueryError::ServiceUnavailable {
                reason: reason.clone(),
            }),
        }
    }

    /// Nearest verses for `query` without explanations.
    ///
    /// Rejects an empty or whitespace-only query and `top_k == 0` before
    /// touching the index. `top_k` above the corpus length is clamped.
    pub fn retrieve(&self, query: &str, top_k: usize) -> QueryResult<Vec<ResultRecord>> {
        Self::validate(query, top_k)?;
        Self::run_query(self.ready()?, query, top_k)
    }

    fn validate(query: &str, top_k: usize) -> QueryResult<()> {
        if query.trim().is_empty() {
            return Err(QueryError::InvalidQuery {
                reason: "query is empty".to_string(),
            });
        }
        if top_k == 0 {
            return Err(QueryError::InvalidQuery {
                reason: "top_k must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn run_query(ready: &Ready, query: &str, top_k: usize) -> QueryResult<Vec<ResultRecord>> {
        let k = top_k.min(ready.corpus.len().max(1));
        let neighbors = Self::nearest(ready, query, k)?;
        Ok(Self::join(ready, neighbors))
    }

    fn nearest(ready: &Ready, query: &str, k: usize) -> QueryResult<Vec<Neighbor>> {
        if ready.index.accepts_text() {
            return Ok(ready.index.query(QueryInput::Text(query), k)?);
        }
        let vector = ready.generator.encode(query)?;
        Ok(ready.index.query(QueryInput::Vector(&vector), k)?)
    }

    fn join(ready: &Ready, neighbors: Vec<Neighbor>) -> Vec<ResultRecord> {
        let mut records = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            let Some(verse) = ready.corpus.get(neighbor.id) else {
                tracing::warn!(
                    verse_id = neighbor.id.get(),
                    corpus_len = ready.corpus.len(),
                    backend = %ready.index.backend(),
                    "index returned a verse id outside the corpus, skipping"
                );
                continue;
            };
            records.push(ResultRecord {
                rank: records.len() + 1,
                chapter: verse.chapter_id,
                verse: verse.verse_number,
                text: verse.text.clone(),
                interpretation: verse.word_meanings.clone(),
                distance: neighbor.distance,
                ai_explanation: None,
            });
        }
        records
    }

    /// Searches for the `top_k` verses nearest to `query`.
    ///
    /// With an explanation provider attached every match carries an
    /// `ai_explanation`, the placeholder when its call failed or timed out.
    ///
    /// Query encoding and the index scan run on the blocking pool.
    pub async fn search(&self, query: &str, top_k: usize) -> QueryResult<SearchResponse> {
        let start = Instant::now();
        Self::validate(query, top_k)?;

        let ready = Arc::clone(self.ready()?);
        let owned_query = query.to_string();
        let mut matches =
            tokio::task::spawn_blocking(move || Self::run_query(&ready, &owned_query, top_k))
                .await??;

        if let Some(explainer) = &self.explainer {
            self.enrich(explainer, query, &mut matches).await;
        }

        tracing::info!(
            query_len = query.len(),
            top_k,
            matches = matches.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "search completed"
        );

        Ok(SearchResponse {
            query: query.to_string(),
            matches,
        })
    }

    async fn enrich(
        &self,
        explainer: &Arc<dyn ExplanationProvider>,
        query: &str,
        records: &mut [ResultRecord],
    ) {
        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrency.max(1)));
        let timeout = self.options.timeout;
        let mut tasks = JoinSet::new();

        for (position, record) in records.iter().enumerate() {
            let explainer = Arc::clone(explainer);
            let semaphore = Arc::clone(&semaphore);
            let query = query.to_string();
            let verse_text = record.text.clone();

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (position, None);
                };
                let call = tokio::task::spawn_blocking(move || explainer.explain(&query, &verse_text));
                let explanation = match tokio::time::timeout(timeout, call).await {
                    Ok(Ok(Ok(text))) => Some(text),
                    Ok(Ok(Err(e))) => {
                        tracing::warn!(rank = position + 1, error = %e, "explanation failed");
                        None
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(rank = position + 1, error = %e, "explanation task aborted");
                        None
                    }
                    Err(_) => {
                        tracing::warn!(
                            rank = position + 1,
                            timeout_ms = timeout.as_millis() as u64,
                            "explanation timed out"
                        );
                        None
                    }
                };
                (position, explanation)
            });
        }

        for record in records.iter_mut() {
            record.ai_explanation = Some(self.options.placeholder.clone());
        }
        while let Some(joined) = tasks.join_next().await {
            if let Ok((position, Some(text))) = joined {
                records[position].ai_explanation = Some(text);
            }
        }
    }

    /// Answers `question` from `context`, or from the `top_k` verses nearest
    /// to the question when no context is given.
    ///
    /// Needs an explanation provider, and a ready service when the verses are
    /// retrieved. A provider failure or timeout is returned as
    /// [`QueryError::Answer`].
    pub async fn answer(
        &self,
        question: &str,
        context: Option<&str>,
        top_k: usize,
    ) -> QueryResult<AnswerResponse> {
        let start = Instant::now();
        match context {
            Some(_) if question.trim().is_empty() => {
                return Err(QueryError::InvalidQuery {
                    reason: "question is empty".to_string(),
                });
            }
            Some(text) if text.trim().is_empty() => {
                return Err(QueryError::InvalidQuery {
                    reason: "context is empty".to_string(),
                });
            }
            Some(_) => {}
            None => Self::validate(question, top_k)?,
        }
        let explainer = Arc::clone(self.explainer.as_ref().ok_or(QueryError::AnswersDisabled)?);

        let (context, sources) = match context {
            Some(text) => (text.to_string(), Vec::new()),
            None => {
                let ready = Arc::clone(self.ready()?);
                let owned_question = question.to_string();
                let sources = tokio::task::spawn_blocking(move || {
                    Self::run_query(&ready, &owned_question, top_k)
                })
                .await??;
                (Self::verse_context(&sources), sources)
            }
        };

        if context.is_empty() {
            tracing::debug!("no verses retrieved, nothing to answer from");
            return Ok(AnswerResponse {
                question: question.to_string(),
                answer: String::new(),
                score: 0.0,
                sources,
            });
        }

        let timeout = self.options.timeout;
        let owned_question = question.to_string();
        let call =
            tokio::task::spawn_blocking(move || explainer.answer(&owned_question, &context));
        let answer = match tokio::time::timeout(timeout, call).await {
            Ok(joined) => joined??,
            Err(_) => {
                return Err(ExplanationError::TimedOut {
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into());
            }
        };

        tracing::info!(
            question_len = question.len(),
            sources = sources.len(),
            score = answer.score,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "answer completed"
        );

        Ok(AnswerResponse {
            question: question.to_string(),
            answer: answer.answer,
            score: answer.score,
            sources,
        })
    }

    /// One paragraph per verse, labelled `chapter.verse`.
    fn verse_context(records: &[ResultRecord]) -> String {
        records
            .iter()
            .map(|r| format!("{}.{} {}", r.chapter, r.verse, r.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Fetches a verse by chapter and verse number.
    pub fn verse(&self, chapter: u32, verse: u32) -> QueryResult<VerseRecord> {
        let ready = self.ready()?;
        let (verse_id, found) = ready
            .corpus
            .find(chapter, verse)
            .ok_or(QueryError::VerseNotFound { chapter, verse })?;

        tracing::debug!(chapter, verse, verse_id = verse_id.get(), "verse found");
        Ok(VerseRecord {
            verse_id,
            chapter,
            verse,
            text: found.text.clone(),
            interpretation: found.word_meanings.clone(),
        })
    }

    pub fn status(&self) -> ServiceStatus {
        let explanations = self.explainer.is_some();
        match &self.state {
            State::Uninitialized { reason, .. } => ServiceStatus {
                state: ServiceState::Uninitialized,
                reason: Some(reason.clone()),
                backend: None,
                model_name: None,
                dimension: None,
                entries: 0,
                corpus_len: 0,
                built_at: None,
                explanations,
            },
            State::Ready(ready) => ServiceStatus {
                state: ServiceState::Ready,
                reason: None,
                backend: Some(ready.index.backend()),
                model_name: Some(ready.index.model_name().to_string()),
                dimension: Some(ready.index.dimension().get()),
                entries: ready.index.len(),
                corpus_len: ready.corpus.len(),
                built_at: ready.metadata.as_ref().map(|m| m.created_at),
                explanations,
            },
        }
    }
}
