//! Flat index query benchmarks
//!
//! Measures exhaustive squared-L2 search over corpora around the size of a
//! full scripture (700 verses) and larger.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use verse_search::vector::{
    EmbeddingGenerator, FlatIndex, HashingEmbeddingGenerator, IndexEntries, QueryInput,
    VectorDimension, VectorIndex, VerseId,
};

const DIMENSION: usize = 384;

fn synthetic_texts(count: usize) -> Vec<String> {
    const WORDS: &[&str] = &[
        "duty", "action", "soul", "mind", "senses", "devotion", "knowledge", "wisdom", "peace",
        "desire", "anger", "surrender", "sacrifice", "eternal", "nature", "yoga", "fruit",
        "attachment", "renunciation", "self",
    ];
    (0..count)
        .map(|i| {
            (0..12)
                .map(|j| WORDS[(i * 7 + j * 13 + i / 3) % WORDS.len()])
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

fn build_index(generator: &HashingEmbeddingGenerator, count: usize) -> FlatIndex {
    let texts = synthetic_texts(count);
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let vectors = generator
        .encode_batch(&refs, 64)
        .expect("Failed to encode synthetic corpus");
    let ids: Vec<VerseId> = (0..count as u32).map(VerseId::new).collect();

    let mut index = FlatIndex::new(generator.dimension(), generator.model_name());
    index
        .add(&ids, IndexEntries::Vectors(&vectors))
        .expect("Failed to add vectors");
    index
}

fn bench_flat_query(c: &mut Criterion) {
    let generator = HashingEmbeddingGenerator::new(
        VectorDimension::new(DIMENSION).expect("Failed to create dimension"),
    );
    let query = generator
        .encode("what is my duty without attachment to the fruit")
        .expect("Failed to encode query");

    let mut group = c.benchmark_group("flat_query");
    for count in [700, 5_000, 20_000] {
        let index = build_index(&generator, count);
        group.throughput(Throughput::Elements(count as u64));

        for k in [1, 10] {
            group.bench_with_input(
                BenchmarkId::new(format!("top_{k}"), count),
                &index,
                |b, index| {
                    b.iter(|| {
                        let neighbors = index
                            .query(QueryInput::Vector(black_box(&query)), k)
                            .expect("Query failed");
                        black_box(neighbors)
                    });
                },
            );
        }
    }
    group.finish();
}

fn bench_query_encoding(c: &mut Criterion) {
    let generator = HashingEmbeddingGenerator::new(
        VectorDimension::new(DIMENSION).expect("Failed to create dimension"),
    );

    c.bench_function("hashing_encode_query", |b| {
        b.iter(|| {
            generator
                .encode(black_box("You have a right to perform your prescribed duty"))
                .expect("Failed to encode")
        });
    });
}

criterion_group!(benches, bench_flat_query, bench_query_encoding);
criterion_main!(benches);
