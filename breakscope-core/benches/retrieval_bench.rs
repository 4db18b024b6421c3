// Benchmark hybrid retrieval: index build, lexical search, full chunk matching.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use breakscope_core::retrieval::HybridMatcher;
use breakscope_core::retrieval::lexical::{LexicalIndex, LexicalParams};
use breakscope_core::types::{ChangedCodeChunk, ChunkMetadata, SpecChunk};

const DIMS: usize = 256;

fn specs(n: usize) -> Vec<SpecChunk> {
    (0..n)
        .map(|i| SpecChunk {
            test_name: format!("flow {i} submits form {}", i % 17),
            filename: format!("cypress/e2e/area_{}.cy.ts", i % 23),
            body: format!(
                "it('flow {i}', () => {{\n  cy.visit('/page/{}');\n  cy.get('[data-testid=field-{i}]').type('x');\n  cy.get('[data-testid=submit-{}]').click();\n}});",
                i % 31,
                i % 13
            ),
        })
        .collect()
}

fn changed(n: usize) -> Vec<ChangedCodeChunk> {
    (0..n)
        .map(|i| ChangedCodeChunk {
            filename: format!("src/components/Form{i}.tsx"),
            raw_diff: format!("-<input data-testid=\"field-{i}\">\n+<input data-testid=\"field-{i}-v2\">"),
            metadata: ChunkMetadata {
                components: vec![format!("Form{i}")],
                test_selectors: vec![format!("field-{i}-v2"), format!("submit-{}", i % 13)],
                ..ChunkMetadata::default()
            },
            summary: format!("Renames field {i}"),
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn vectors(n: usize, seed: usize) -> Vec<Vec<f32>> {
    (0..n)
        .map(|i| {
            (0..DIMS)
                .map(|d| (((i * 31 + d * 7 + seed) % 97) as f32) / 97.0 - 0.5)
                .collect()
        })
        .collect()
}

fn bench_index_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexical_index_build");
    for count in [100, 1_000, 5_000] {
        let corpus = specs(count);
        group.bench_with_input(BenchmarkId::new("specs", count), &corpus, |b, corpus| {
            b.iter(|| LexicalIndex::build(corpus, LexicalParams::default()));
        });
    }
    group.finish();
}

fn bench_lexical_search(c: &mut Criterion) {
    let corpus = specs(2_000);
    let index = LexicalIndex::build(&corpus, LexicalParams::default());
    c.bench_function("lexical_search_2000", |b| {
        b.iter(|| index.search_ranked("Form12 field-12-v2 submit-12 renames field"));
    });
}

fn bench_match_chunks(c: &mut Criterion) {
    let matcher = HybridMatcher::default();
    let mut group = c.benchmark_group("match_chunks_detailed");
    for (chunk_count, spec_count) in [(10, 200), (50, 1_000), (200, 2_000)] {
        let chunks = changed(chunk_count);
        let corpus = specs(spec_count);
        let chunk_vectors = vectors(chunk_count, 1);
        let spec_vectors = vectors(spec_count, 2);
        group.bench_function(
            BenchmarkId::new("chunks_x_specs", format!("{chunk_count}x{spec_count}")),
            |b| {
                b.iter(|| {
                    matcher
                        .match_chunks_detailed(&chunks, &chunk_vectors, &corpus, &spec_vectors)
                        .unwrap()
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_index_build,
    bench_lexical_search,
    bench_match_chunks
);
criterion_main!(benches);
