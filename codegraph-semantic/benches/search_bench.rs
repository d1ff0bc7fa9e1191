//! Linear search benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use codegraph_semantic::{
    CodeChunk, EmbeddingError, EmbeddingIndex, EmbeddingProvider, NoopEmbeddingCache,
};

const DIMENSIONS: usize = 256;

/// Cheap deterministic vectors so the benchmark measures ranking only
struct SyntheticProvider;

impl EmbeddingProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| synthetic_vector(t)).collect())
    }
}

fn synthetic_vector(text: &str) -> Vec<f32> {
    let seed = text
        .bytes()
        .fold(0x9e37_79b9_u32, |acc, b| acc.rotate_left(5) ^ b as u32);
    (0..DIMENSIONS)
        .map(|i| ((seed.wrapping_mul(i as u32 + 1) % 2000) as f32 / 1000.0) - 1.0)
        .collect()
}

fn build_index(size: usize) -> EmbeddingIndex {
    let mut index = EmbeddingIndex::new(Arc::new(SyntheticProvider), Arc::new(NoopEmbeddingCache));
    let chunks = (0..size)
        .map(|i| {
            CodeChunk::new(
                format!("chunk-{i}"),
                format!("src/file{}.swift", i % 100),
                format!("func handler{i}() {{}}"),
            )
        })
        .collect();
    index
        .index(chunks)
        .expect("synthetic provider cannot fail");
    index
}

fn bench_search_vector(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_vector");
    let query = synthetic_vector("token refresh");

    for size in [1_000, 10_000, 50_000] {
        let index = build_index(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &index, |b, index| {
            b.iter(|| index.search_vector(black_box(&query), 10))
        });
    }
    group.finish();
}

fn bench_similar_to(c: &mut Criterion) {
    let index = build_index(10_000);
    c.bench_function("similar_to_10k", |b| {
        b.iter(|| index.similar_to(black_box("chunk-42"), 10))
    });
}

criterion_group!(benches, bench_search_vector, bench_similar_to);
criterion_main!(benches);
