#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use verse_search::vector::{EmbeddingGenerator, HashingEmbeddingGenerator, VectorDimension};
use verse_search::{BackendKind, Settings};

/// Offline model used by every integration test.
pub const TEST_MODEL: &str = "hashing-256";

pub mod sample_corpus {
    pub const GITA_2_47: &str = r#"[
  {
    "chapter_id": 2,
    "verse_number": 47,
    "text": "You have a right to perform your prescribed duty, but you are not entitled to the fruits of action.",
    "word_meanings": "karmaṇi — prescribed duties; eva — certainly; adhikāraḥ — right; te — of you"
  }
]"#;

    pub const SMALL: &str = r#"[
  {
    "chapter_id": 2,
    "verse_number": 20,
    "text": "For the soul there is neither birth nor death at any time. It is unborn, eternal, ever-existing and primeval.",
    "word_meanings": "na — never; jāyate — takes birth; mriyate — dies"
  },
  {
    "chapter_id": 2,
    "verse_number": 47,
    "text": "You have a right to perform your prescribed duty, but you are not entitled to the fruits of action.",
    "word_meanings": "karmaṇi — prescribed duties; eva — certainly; adhikāraḥ — right"
  },
  {
    "chapter_id": 2,
    "verse_number": 62,
    "text": "While contemplating the objects of the senses, attachment develops, and from attachment lust arises.",
    "word_meanings": "dhyāyataḥ — while contemplating; viṣayān — sense objects"
  },
  {
    "chapter_id": 4,
    "verse_number": 7,
    "text": "Whenever there is a decline in religious practice and a predominant rise of irreligion, at that time I descend Myself.",
    "word_meanings": "yadā — whenever; dharmasya — of religion; glāniḥ — discrepancies"
  },
  {
    "chapter_id": 6,
    "verse_number": 5,
    "text": "One must deliver himself with the help of his mind, and not degrade himself. The mind is the friend and also the enemy.",
    "word_meanings": "uddharet — one must deliver; ātmanā — by the mind"
  },
  {
    "chapter_id": 18,
    "verse_number": 66,
    "text": "Abandon all varieties of religion and just surrender unto Me. I shall deliver you from all sinful reactions. Do not fear.",
    "word_meanings": "sarva-dharmān — all varieties of religion; parityajya — abandoning"
  }
]"#;
}

pub fn hashing_generator() -> Arc<dyn EmbeddingGenerator> {
    Arc::new(HashingEmbeddingGenerator::new(
        VectorDimension::new(256).expect("valid dimension"),
    ))
}

/// A throwaway workspace with its own corpus file and index directory.
pub struct TestWorkspace {
    pub dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn with_corpus(json: &str) -> Self {
        let workspace = Self::new();
        workspace.write_corpus(json);
        workspace
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn corpus_path(&self) -> PathBuf {
        self.path().join("verse.json")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.path().join(".verse-search").join("index")
    }

    pub fn write_corpus(&self, json: &str) -> PathBuf {
        let path = self.corpus_path();
        fs::write(&path, json).expect("Failed to write corpus");
        path
    }

    /// Settings rooted at this workspace using the offline model.
    pub fn settings(&self, backend: BackendKind) -> Settings {
        let mut settings = Settings::default();
        settings.workspace_root = Some(self.path().to_path_buf());
        settings.index_path = PathBuf::from(".verse-search/index");
        settings.corpus_path = PathBuf::from("verse.json");
        settings.embedding.model = TEST_MODEL.to_string();
        settings.index.backend = backend;
        settings
    }
}
