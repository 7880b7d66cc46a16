//! Ranking guarantees of a built index served through the query service.

use crate::common::{TestWorkspace, hashing_generator, sample_corpus};
use verse_search::vector::{FlatIndex, IndexEntries, VectorIndex, VerseId};
use verse_search::{BackendKind, Corpus, IndexBuilder, QueryError, QueryService};

fn ready_service(json: &str, backend: BackendKind) -> (QueryService, TestWorkspace) {
    let workspace = TestWorkspace::with_corpus(json);
    let generator = hashing_generator();
    IndexBuilder::new(generator.clone(), backend)
        .run(&workspace.corpus_path(), &workspace.index_dir())
        .expect("build should succeed");

    let service = QueryService::open(
        &workspace.index_dir(),
        &workspace.corpus_path(),
        backend,
        generator,
    )
    .expect("service should open");
    (service, workspace)
}

#[test]
fn test_every_verse_retrieves_itself_first() {
    for backend in [BackendKind::Flat, BackendKind::Managed] {
        let (service, _workspace) = ready_service(sample_corpus::SMALL, backend);
        let corpus = Corpus::parse(sample_corpus::SMALL).unwrap();

        for verse in corpus.iter() {
            let matches = service.retrieve(&verse.text, 3).unwrap();
            let top = &matches[0];
            assert_eq!(top.rank, 1);
            assert_eq!(
                (top.chapter, top.verse),
                (verse.chapter_id, verse.verse_number),
                "{backend} backend ranked another verse above {}.{}",
                verse.chapter_id,
                verse.verse_number
            );
            assert!(top.distance.abs() < 1e-5, "distance was {}", top.distance);
        }
    }
}

#[test]
fn test_result_count_bounded_by_top_k_and_corpus() {
    let (service, _workspace) = ready_service(sample_corpus::SMALL, BackendKind::Flat);

    for top_k in [1, 3, 6, 50] {
        let matches = service.retrieve("mind and senses", top_k).unwrap();
        assert_eq!(matches.len(), top_k.min(6));
        let ranks: Vec<usize> = matches.iter().map(|m| m.rank).collect();
        assert_eq!(ranks, (1..=matches.len()).collect::<Vec<_>>());
    }
}

#[test]
fn test_distances_never_decrease_down_the_ranking() {
    let (service, _workspace) = ready_service(sample_corpus::SMALL, BackendKind::Flat);

    for query in [
        "what happens to the soul at death",
        "surrender and fear",
        "duty without attachment to results",
    ] {
        let matches = service.retrieve(query, 6).unwrap();
        for pair in matches.windows(2) {
            assert!(
                pair[0].distance <= pair[1].distance,
                "'{query}': rank {} at {} above rank {} at {}",
                pair[0].rank,
                pair[0].distance,
                pair[1].rank,
                pair[1].distance
            );
        }
    }
}

#[test]
fn test_rebuild_with_same_corpus_keeps_top_results() {
    let workspace = TestWorkspace::with_corpus(sample_corpus::SMALL);
    let generator = hashing_generator();
    let builder = IndexBuilder::new(generator.clone(), BackendKind::Flat);
    let queries = ["soul", "duty and action", "religion", "the mind is a friend"];

    let top_ids = || {
        let service = QueryService::open(
            &workspace.index_dir(),
            &workspace.corpus_path(),
            BackendKind::Flat,
            generator.clone(),
        )
        .unwrap();
        queries
            .iter()
            .map(|q| {
                let top = &service.retrieve(q, 1).unwrap()[0];
                (top.chapter, top.verse)
            })
            .collect::<Vec<_>>()
    };

    builder
        .run(&workspace.corpus_path(), &workspace.index_dir())
        .unwrap();
    let first = top_ids();

    builder
        .run(&workspace.corpus_path(), &workspace.index_dir())
        .unwrap();
    let second = top_ids();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_blank_queries_are_rejected() {
    let (service, _workspace) = ready_service(sample_corpus::SMALL, BackendKind::Flat);

    for query in ["", "   ", "\n\t"] {
        let err = service.search(query, 3).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidQuery { .. }), "got {err:?}");
    }

    let err = service.search("duty", 0).await.unwrap_err();
    assert!(matches!(err, QueryError::InvalidQuery { .. }));
}

#[test]
fn test_ids_beyond_corpus_are_skipped() {
    let full = Corpus::parse(sample_corpus::SMALL).unwrap();
    let generator = hashing_generator();

    let texts: Vec<&str> = full.texts();
    let vectors = generator.encode_batch(&texts, 8).unwrap();
    let ids: Vec<VerseId> = (0..vectors.len() as u32).map(VerseId::new).collect();
    let mut index = FlatIndex::new(generator.dimension(), generator.model_name());
    index.add(&ids, IndexEntries::Vectors(&vectors)).unwrap();

    // Corpus shrank to its first three verses after the index was built.
    let truncated = Corpus::from_verses(full.iter().take(3).cloned().collect());
    let service = QueryService::new_ready(truncated, Box::new(index), generator);

    // Verse 6.5 is id 4, only present in the index.
    let matches = service
        .retrieve(
            "One must deliver himself with the help of his mind, and not degrade himself.",
            3,
        )
        .unwrap();

    assert!(matches.len() <= 3);
    assert!(matches.iter().all(|m| (m.chapter, m.verse) != (6, 5)));
    let ranks: Vec<usize> = matches.iter().map(|m| m.rank).collect();
    assert_eq!(ranks, (1..=matches.len()).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_gita_2_47_scenario() {
    let (service, _workspace) = ready_service(sample_corpus::GITA_2_47, BackendKind::Flat);

    let response = service.search("duty and action", 1).await.unwrap();

    assert_eq!(response.query, "duty and action");
    assert_eq!(response.matches.len(), 1);
    let top = &response.matches[0];
    assert_eq!(top.rank, 1);
    assert_eq!((top.chapter, top.verse), (2, 47));
    assert_eq!(
        top.text,
        "You have a right to perform your prescribed duty, but you are not entitled to the fruits of action."
    );
    assert!(top.interpretation.starts_with("karmaṇi — prescribed duties"));
    assert!(top.distance >= 0.0 && top.distance < 2.0);
    assert!(top.ai_explanation.is_none());
}
