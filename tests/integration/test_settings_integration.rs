//! Settings files written by `init` and read back by the service.

use std::fs;

use crate::common::{TEST_MODEL, TestWorkspace, hashing_generator, sample_corpus};
use verse_search::config::{CONFIG_DIR, SETTINGS_FILE};
use verse_search::explain::DEFAULT_PLACEHOLDER;
use verse_search::io::ExitCode;
use verse_search::{BackendKind, IndexBuilder, QueryError, QueryService, Settings};

#[test]
fn test_init_writes_loadable_settings() {
    let workspace = TestWorkspace::new();

    let path = Settings::init_config_file_in(workspace.path(), false).unwrap();
    assert_eq!(path, workspace.path().join(CONFIG_DIR).join(SETTINGS_FILE));

    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.workspace_root.as_deref(), Some(workspace.path()));
    assert_eq!(settings.index_dir(), workspace.index_dir());
    assert_eq!(settings.corpus_file(), workspace.corpus_path());
    assert_eq!(settings.index.backend, BackendKind::Flat);
    assert_eq!(settings.search.default_top_k, 3);
    assert!(!settings.explanation.enabled);
}

#[test]
fn test_init_refuses_to_overwrite_without_force() {
    let workspace = TestWorkspace::new();
    let path = Settings::init_config_file_in(workspace.path(), false).unwrap();
    fs::write(&path, "version = 1\n").unwrap();

    assert!(Settings::init_config_file_in(workspace.path(), false).is_err());
    assert_eq!(fs::read_to_string(&path).unwrap(), "version = 1\n");

    Settings::init_config_file_in(workspace.path(), true).unwrap();
    assert!(fs::read_to_string(&path).unwrap().contains("[embedding]"));
}

#[test]
fn test_edited_settings_select_backend_and_model() {
    let workspace = TestWorkspace::with_corpus(sample_corpus::SMALL);
    let path = Settings::init_config_file_in(workspace.path(), false).unwrap();

    let mut settings = Settings::load_from(&path).unwrap();
    settings.embedding.model = TEST_MODEL.to_string();
    settings.index.backend = BackendKind::Managed;
    settings.save(&path).unwrap();

    let reloaded = Settings::load_from(&path).unwrap();
    assert_eq!(reloaded.embedding.model, TEST_MODEL);
    assert_eq!(reloaded.index.backend, BackendKind::Managed);

    IndexBuilder::new(hashing_generator(), BackendKind::Managed)
        .run(&reloaded.corpus_file(), &reloaded.index_dir())
        .unwrap();
    assert!(QueryService::from_settings(&reloaded).is_ready());
}

#[tokio::test]
async fn test_unreachable_explainer_degrades_to_placeholder() {
    let workspace = TestWorkspace::with_corpus(sample_corpus::SMALL);
    let mut settings = workspace.settings(BackendKind::Flat);
    IndexBuilder::new(hashing_generator(), BackendKind::Flat)
        .run(&settings.corpus_file(), &settings.index_dir())
        .unwrap();

    settings.explanation.enabled = true;
    settings.explanation.endpoint = "http://127.0.0.1:9/v1".to_string();
    settings.explanation.timeout_ms = 2_000;
    settings.explanation.api_key_env = "VERSE_SEARCH_TEST_UNSET_KEY".to_string();

    let service = QueryService::from_settings(&settings);
    assert!(service.status().explanations);

    let response = service.search("duty and action", 2).await.unwrap();
    assert_eq!(response.matches.len(), 2);
    for record in &response.matches {
        assert_eq!(record.ai_explanation.as_deref(), Some(DEFAULT_PLACEHOLDER));
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_fails_answer() {
    let workspace = TestWorkspace::with_corpus(sample_corpus::SMALL);
    let mut settings = workspace.settings(BackendKind::Flat);
    IndexBuilder::new(hashing_generator(), BackendKind::Flat)
        .run(&settings.corpus_file(), &settings.index_dir())
        .unwrap();

    let service = QueryService::from_settings(&settings);
    assert!(matches!(
        service.answer("what is my duty?", None, 2).await,
        Err(QueryError::AnswersDisabled)
    ));

    settings.explanation.enabled = true;
    settings.explanation.endpoint = "http://127.0.0.1:9/v1".to_string();
    settings.explanation.timeout_ms = 2_000;
    settings.explanation.api_key_env = "VERSE_SEARCH_TEST_UNSET_KEY".to_string();

    let service = QueryService::from_settings(&settings);
    let err = service
        .answer("what is my duty?", None, 2)
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Answer(_)), "got {err:?}");
    assert_eq!(ExitCode::from_error(&err), ExitCode::GeneralError);
}
