//! Verse corpus loading and validation.
//!
//! The corpus file is a JSON array of verse objects. Array position is the
//! verse id, so the same file must be used to build an index and to answer
//! queries against it.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::vector::VerseId;

/// Error type for corpus loading
#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("Corpus file '{path}' not found")]
    NotFound { path: PathBuf },

    #[error("Failed to read corpus file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse corpus file '{path}': {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid verse record #{index}: field '{field}' {problem}")]
    Validation {
        index: usize,
        field: &'static str,
        problem: &'static str,
    },

    #[error("Failed to write corpus file '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A single verse record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verse {
    pub chapter_id: u32,
    pub verse_number: u32,
    pub text: String,
    pub word_meanings: String,
}

/// Ordered, read-only sequence of verses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    verses: Vec<Verse>,
}

impl Corpus {
    /// Loads and validates the corpus at `path`.
    pub fn load(path: &Path) -> Result<Self, CorpusError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CorpusError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                CorpusError::Read {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;

        let corpus = Self::parse(&contents).map_err(|e| match e {
            CorpusError::Parse { reason, .. } => CorpusError::Parse {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })?;

        tracing::debug!(path = %path.display(), verses = corpus.len(), "loaded corpus");
        Ok(corpus)
    }

    /// Parses corpus JSON, validating every record.
    pub fn parse(json: &str) -> Result<Self, CorpusError> {
        let parse_error = |reason: String| CorpusError::Parse {
            path: PathBuf::new(),
            reason,
        };

        let value: Value = serde_json::from_str(json).map_err(|e| parse_error(e.to_string()))?;
        let Value::Array(records) = value else {
            return Err(parse_error("expected a JSON array of verse objects".into()));
        };

        let verses = records
            .iter()
            .enumerate()
            .map(|(index, record)| match record {
                Value::Object(fields) => Self::parse_verse(index, fields),
                _ => Err(parse_error(format!("record #{index} is not a JSON object"))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { verses })
    }

    fn parse_verse(index: usize, fields: &Map<String, Value>) -> Result<Verse, CorpusError> {
        let int_field = |field: &'static str| -> Result<u32, CorpusError> {
            match fields.get(field) {
                None | Some(Value::Null) => Err(CorpusError::Validation {
                    index,
                    field,
                    problem: "is missing",
                }),
                Some(value) => value
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or(CorpusError::Validation {
                        index,
                        field,
                        problem: "must be a non-negative integer",
                    }),
            }
        };
        let str_field = |field: &'static str| -> Result<String, CorpusError> {
            match fields.get(field) {
                None | Some(Value::Null) => Err(CorpusError::Validation {
                    index,
                    field,
                    problem: "is missing",
                }),
                Some(Value::String(s)) => Ok(s.clone()),
                Some(_) => Err(CorpusError::Validation {
                    index,
                    field,
                    problem: "must be a string",
                }),
            }
        };

        Ok(Verse {
            chapter_id: int_field("chapter_id")?,
            verse_number: int_field("verse_number")?,
            text: str_field("text")?,
            word_meanings: str_field("word_meanings")?,
        })
    }

    #[must_use]
    pub fn from_verses(verses: Vec<Verse>) -> Self {
        Self { verses }
    }

    /// Writes the corpus as a JSON array, the format [`Corpus::load`] reads.
    pub fn save(&self, path: &Path) -> Result<(), CorpusError> {
        let write_error = |source| CorpusError::Write {
            path: path.to_path_buf(),
            source,
        };
        let json = serde_json::to_string_pretty(&self.verses)
            .map_err(|e| write_error(std::io::Error::other(e)))?;
        std::fs::write(path, json).map_err(write_error)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.verses.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.verses.is_empty()
    }

    /// Looks up a verse by id; `None` when the id is outside `[0, len)`.
    #[must_use]
    pub fn get(&self, id: VerseId) -> Option<&Verse> {
        self.verses.get(id.index())
    }

    /// Finds a verse by its chapter and verse number.
    #[must_use]
    pub fn find(&self, chapter: u32, verse: u32) -> Option<(VerseId, &Verse)> {
        self.verses
            .iter()
            .enumerate()
            .find(|(_, v)| v.chapter_id == chapter && v.verse_number == verse)
            .and_then(|(i, v)| VerseId::from_index(i).map(|id| (id, v)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Verse> {
        self.verses.iter()
    }

    /// Verse texts in id order.
    #[must_use]
    pub fn texts(&self) -> Vec<&str> {
        self.verses.iter().map(|v| v.text.as_str()).collect()
    }

    /// Hex SHA-256 of the canonical JSON form, recorded alongside an index.
    #[must_use]
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        for verse in &self.verses {
            // Serializing a plain struct of ints and strings cannot fail.
            if let Ok(bytes) = serde_json::to_vec(verse) {
                hasher.update(&bytes);
            }
            hasher.update(b"\n");
        }
        hasher
            .finalize()
            .iter()
            .fold(String::with_capacity(64), |mut out, byte| {
                let _ = write!(out, "{byte:02x}");
                out
            })
    }
}
