//! Building, publishing and reopening persisted indexes.

use std::fs;
use std::sync::Arc;

use crate::common::{TestWorkspace, hashing_generator, sample_corpus};
use verse_search::io::ExitCode;
use verse_search::vector::{
    HashingEmbeddingGenerator, IndexMetadata, METADATA_FILE, VECTORS_FILE, VectorDimension,
};
use verse_search::{
    BackendKind, IndexBuilder, QueryError, QueryService, ServiceState, StartupError, StorageError,
};

#[test]
fn test_build_report_describes_published_index() {
    let workspace = TestWorkspace::with_corpus(sample_corpus::SMALL);

    let report = IndexBuilder::new(hashing_generator(), BackendKind::Flat)
        .with_batch_size(2)
        .run(&workspace.corpus_path(), &workspace.index_dir())
        .unwrap();

    assert_eq!(report.verses, 6);
    assert_eq!(report.backend, BackendKind::Flat);
    assert_eq!(report.model_name, "hashing-256");
    assert_eq!(report.dimension, 256);
    assert_eq!(report.path, workspace.index_dir());

    let metadata = IndexMetadata::load(&workspace.index_dir()).unwrap();
    assert_eq!(metadata.entry_count, 6);
    assert_eq!(metadata.corpus_len, 6);
    assert!(workspace.index_dir().join(VECTORS_FILE).exists());
}

#[test]
fn test_managed_backend_serves_queries() {
    let workspace = TestWorkspace::with_corpus(sample_corpus::SMALL);
    let generator = hashing_generator();

    IndexBuilder::new(generator.clone(), BackendKind::Managed)
        .run(&workspace.corpus_path(), &workspace.index_dir())
        .unwrap();
    assert!(!workspace.index_dir().join(VECTORS_FILE).exists());

    let service = QueryService::open(
        &workspace.index_dir(),
        &workspace.corpus_path(),
        BackendKind::Managed,
        generator,
    )
    .unwrap();

    let status = service.status();
    assert_eq!(status.state, ServiceState::Ready);
    assert_eq!(status.backend, Some(BackendKind::Managed));
    assert_eq!(status.entries, 6);

    let matches = service.retrieve("surrender unto Me and do not fear", 2).unwrap();
    assert_eq!((matches[0].chapter, matches[0].verse), (18, 66));
}

#[test]
fn test_open_rejects_other_backend() {
    let workspace = TestWorkspace::with_corpus(sample_corpus::SMALL);
    IndexBuilder::new(hashing_generator(), BackendKind::Flat)
        .run(&workspace.corpus_path(), &workspace.index_dir())
        .unwrap();

    let err = QueryService::open(
        &workspace.index_dir(),
        &workspace.corpus_path(),
        BackendKind::Managed,
        hashing_generator(),
    )
    .unwrap_err();

    assert!(
        matches!(err, StartupError::Storage(StorageError::Incompatible { .. })),
        "got {err:?}"
    );
}

#[test]
fn test_open_rejects_other_model() {
    let workspace = TestWorkspace::with_corpus(sample_corpus::SMALL);
    IndexBuilder::new(hashing_generator(), BackendKind::Flat)
        .run(&workspace.corpus_path(), &workspace.index_dir())
        .unwrap();

    let other = Arc::new(HashingEmbeddingGenerator::new(
        VectorDimension::new(128).unwrap(),
    ));
    let err = QueryService::open(
        &workspace.index_dir(),
        &workspace.corpus_path(),
        BackendKind::Flat,
        other,
    )
    .unwrap_err();

    assert!(matches!(
        err,
        StartupError::Storage(StorageError::Incompatible { .. })
    ));
}

#[test]
fn test_truncated_vector_file_is_corrupt() {
    let workspace = TestWorkspace::with_corpus(sample_corpus::SMALL);
    IndexBuilder::new(hashing_generator(), BackendKind::Flat)
        .run(&workspace.corpus_path(), &workspace.index_dir())
        .unwrap();

    let vectors = workspace.index_dir().join(VECTORS_FILE);
    let bytes = fs::read(&vectors).unwrap();
    fs::write(&vectors, &bytes[..bytes.len() / 2]).unwrap();

    let err = QueryService::open(
        &workspace.index_dir(),
        &workspace.corpus_path(),
        BackendKind::Flat,
        hashing_generator(),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        StartupError::Storage(StorageError::Corrupt { .. })
    ));
}

#[test]
fn test_stored_corpus_snapshot_used_when_source_is_gone() {
    let workspace = TestWorkspace::with_corpus(sample_corpus::SMALL);
    let generator = hashing_generator();
    IndexBuilder::new(generator.clone(), BackendKind::Flat)
        .run(&workspace.corpus_path(), &workspace.index_dir())
        .unwrap();

    fs::remove_file(workspace.corpus_path()).unwrap();

    let service = QueryService::open(
        &workspace.index_dir(),
        &workspace.corpus_path(),
        BackendKind::Flat,
        generator,
    )
    .unwrap();

    let record = service.verse(2, 47).unwrap();
    assert!(record.text.contains("prescribed duty"));
    assert_eq!(record.verse_id.get(), 1);
}

#[test]
fn test_edited_corpus_still_serves() {
    let workspace = TestWorkspace::with_corpus(sample_corpus::SMALL);
    let generator = hashing_generator();
    IndexBuilder::new(generator.clone(), BackendKind::Flat)
        .run(&workspace.corpus_path(), &workspace.index_dir())
        .unwrap();

    // One verse instead of six: ids 1..6 now point past the corpus.
    workspace.write_corpus(sample_corpus::GITA_2_47);

    let service = QueryService::open(
        &workspace.index_dir(),
        &workspace.corpus_path(),
        BackendKind::Flat,
        generator,
    )
    .unwrap();

    let matches = service.retrieve("religion", 5).unwrap();
    assert!(matches.len() <= 1);
}

#[test]
fn test_failed_rebuild_keeps_previous_index() {
    let workspace = TestWorkspace::with_corpus(sample_corpus::SMALL);
    let builder = IndexBuilder::new(hashing_generator(), BackendKind::Flat);
    builder
        .run(&workspace.corpus_path(), &workspace.index_dir())
        .unwrap();
    let before = fs::read(workspace.index_dir().join(METADATA_FILE)).unwrap();

    workspace.write_corpus(r#"[{"chapter_id": 1, "verse_number": 1, "text": "broken"}]"#);
    assert!(
        builder
            .run(&workspace.corpus_path(), &workspace.index_dir())
            .is_err()
    );

    let after = fs::read(workspace.index_dir().join(METADATA_FILE)).unwrap();
    assert_eq!(before, after);

    let leftovers: Vec<_> = fs::read_dir(workspace.index_dir().parent().unwrap())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(".index-staging-"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn test_rebuild_replaces_backend() {
    let workspace = TestWorkspace::with_corpus(sample_corpus::SMALL);
    let generator = hashing_generator();

    IndexBuilder::new(generator.clone(), BackendKind::Flat)
        .run(&workspace.corpus_path(), &workspace.index_dir())
        .unwrap();
    IndexBuilder::new(generator.clone(), BackendKind::Managed)
        .run(&workspace.corpus_path(), &workspace.index_dir())
        .unwrap();

    assert!(!workspace.index_dir().join(VECTORS_FILE).exists());
    let metadata = IndexMetadata::load(&workspace.index_dir()).unwrap();
    assert_eq!(metadata.backend, BackendKind::Managed);
    assert_eq!(metadata.entry_count, 6);
}

#[tokio::test]
async fn test_settings_without_index_start_unavailable() {
    let workspace = TestWorkspace::with_corpus(sample_corpus::SMALL);
    let service = QueryService::from_settings(&workspace.settings(BackendKind::Flat));

    assert_eq!(service.state(), ServiceState::Uninitialized);
    let status = service.status();
    assert!(status.reason.is_some());
    assert_eq!(status.entries, 0);

    let err = service.search("duty", 3).await.unwrap_err();
    assert!(matches!(err, QueryError::ServiceUnavailable { .. }));
    let err = service.verse(2, 47).unwrap_err();
    assert!(matches!(err, QueryError::ServiceUnavailable { .. }));
}

#[tokio::test]
async fn test_settings_drive_build_and_search() {
    let workspace = TestWorkspace::with_corpus(sample_corpus::SMALL);
    let settings = workspace.settings(BackendKind::Managed);

    let generator =
        verse_search::vector::create_embedding_generator(&settings.embedding).unwrap();
    IndexBuilder::new(generator, settings.index.backend)
        .with_batch_size(settings.embedding.batch_size)
        .run(&settings.corpus_file(), &settings.index_dir())
        .unwrap();
    assert_eq!(settings.index_dir(), workspace.index_dir());

    let service = QueryService::from_settings(&settings);
    assert!(service.is_ready());

    let response = service
        .search("the soul is unborn and eternal", settings.search.default_top_k)
        .await
        .unwrap();
    assert_eq!(response.matches.len(), 3);
    assert_eq!(
        (response.matches[0].chapter, response.matches[0].verse),
        (2, 20)
    );
    assert!(response.matches.iter().all(|m| m.ai_explanation.is_none()));

    let err = service.verse(3, 99).unwrap_err();
    assert!(matches!(
        err,
        QueryError::VerseNotFound {
            chapter: 3,
            verse: 99
        }
    ));
}

#[tokio::test]
async fn test_corrupt_index_keeps_startup_cause() {
    let workspace = TestWorkspace::with_corpus(sample_corpus::SMALL);
    let settings = workspace.settings(BackendKind::Flat);
    IndexBuilder::new(hashing_generator(), BackendKind::Flat)
        .run(&settings.corpus_file(), &settings.index_dir())
        .unwrap();
    fs::write(workspace.index_dir().join(VECTORS_FILE), b"VSIX").unwrap();

    let service = QueryService::from_settings(&settings);
    assert!(!service.is_ready());
    let cause = service.startup_error().expect("load failure should be kept");
    assert!(matches!(
        cause,
        StartupError::Storage(StorageError::Corrupt { .. })
    ));
    assert_eq!(ExitCode::from_startup_error(cause), ExitCode::IndexCorrupted);

    let err = service.search("duty", 3).await.unwrap_err();
    assert!(matches!(err, QueryError::ServiceUnavailable { .. }));
}

#[test]
fn test_missing_index_maps_to_unavailable() {
    let workspace = TestWorkspace::with_corpus(sample_corpus::SMALL);
    let service = QueryService::from_settings(&workspace.settings(BackendKind::Flat));

    let cause = service.startup_error().expect("load failure should be kept");
    assert_eq!(
        ExitCode::from_startup_error(cause),
        ExitCode::ServiceUnavailable
    );
}
