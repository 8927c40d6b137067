//! DocIndex benchmarks
//!
//! Run with: cargo bench --bench docindex_bench
//!
//! - columns_stack: stacking a batch of documents into a column store
//! - columns_view_write: in-place tensor write through a bound view
//! - index_insert: batch insert through the Redis adapter
//! - index_find: KNN search, FLAT and HNSW, across collection sizes
//! - index_text_search: BM25 text search

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use docindex::{
    ColumnKind, ColumnOptions, ColumnStore, DocIndex, Document, DocumentType, MemoryTransport,
    RedisConfig, RedisIndex, TensorSpec,
};

const DIM: usize = 64;
const BENCH_SEED: u64 = 0xDEADBEEF_CAFEBABE;
const WORDS: [&str; 8] = ["red", "blue", "shoe", "hat", "lamp", "desk", "chair", "mug"];

fn lcg_next(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
    *state
}

fn random_vector(dimension: usize, seed: u64) -> Vec<f32> {
    let mut state = seed;
    (0..dimension)
        .map(|_| (lcg_next(&mut state) as f32 / u64::MAX as f32) * 2.0 - 1.0)
        .collect()
}

fn doc_type() -> Arc<DocumentType> {
    DocumentType::builder("Item")
        .text("title")
        .int("rank")
        .tensor("embedding", TensorSpec::vector(DIM))
        .build()
        .expect("valid document type")
}

fn documents(ty: &Arc<DocumentType>, count: usize) -> Vec<Document> {
    (0..count)
        .map(|i| {
            let title = format!("{} {}", WORDS[i % WORDS.len()], WORDS[(i / 3) % WORDS.len()]);
            Document::new(ty, format!("doc_{:08}", i))
                .with("title", title)
                .and_then(|d| d.with("rank", i as i64))
                .and_then(|d| d.with("embedding", random_vector(DIM, BENCH_SEED ^ i as u64)))
                .expect("valid document")
        })
        .collect()
}

fn index_with(
    ty: &Arc<DocumentType>,
    algorithm: &str,
    count: usize,
) -> DocIndex<RedisIndex<MemoryTransport>> {
    let config = RedisConfig::default().with_column_defaults(
        ColumnKind::Vector,
        ColumnOptions::default()
            .with_algorithm(algorithm)
            .with_distance("L2"),
    );
    let backend = RedisIndex::new(MemoryTransport::new(), config).expect("valid config");
    let index = DocIndex::new(ty, backend).expect("index created");
    index.index(&documents(ty, count)).expect("documents indexed");
    index
}

fn bench_columns(c: &mut Criterion) {
    let ty = doc_type();
    let views: Vec<_> = documents(&ty, 1000)
        .into_iter()
        .map(Document::into_view)
        .collect();

    let mut group = c.benchmark_group("columns_stack");
    group.throughput(Throughput::Elements(views.len() as u64));
    group.bench_function("n=1000", |b| {
        b.iter(|| ColumnStore::from_batch(black_box(&ty), black_box(&views)).expect("stacked"))
    });
    group.finish();

    let store = ColumnStore::from_batch(&ty, &views).expect("stacked");
    let replacement = random_vector(DIM, 7);
    c.bench_function("columns_view_write", |b| {
        let mut view = store.bind(500).expect("row exists");
        b.iter(|| {
            view.set("embedding", black_box(replacement.clone()))
                .expect("write")
        })
    });
}

fn bench_insert(c: &mut Criterion) {
    let ty = doc_type();
    let docs = documents(&ty, 500);

    let mut group = c.benchmark_group("index_insert");
    group.throughput(Throughput::Elements(docs.len() as u64));
    group.bench_function("n=500", |b| {
        let index = index_with(&ty, "FLAT", 0);
        b.iter(|| index.index(black_box(&docs)).expect("indexed"))
    });
    group.finish();
}

fn bench_find(c: &mut Criterion) {
    let ty = doc_type();
    let query = random_vector(DIM, 42);

    let mut group = c.benchmark_group("index_find");
    for algorithm in ["FLAT", "HNSW"] {
        for count in [100, 1000] {
            let index = index_with(&ty, algorithm, count);
            group.bench_with_input(
                BenchmarkId::new(algorithm, count),
                &count,
                |b, _| b.iter(|| index.find(black_box(&query), "embedding", 10).expect("search")),
            );
        }
    }
    group.finish();
}

fn bench_text_search(c: &mut Criterion) {
    let ty = doc_type();
    let index = index_with(&ty, "FLAT", 1000);
    c.bench_function("index_text_search", |b| {
        b.iter(|| {
            index
                .text_search(black_box("red lamp"), "title", 10)
                .expect("search")
        })
    });
}

criterion_group!(
    benches,
    bench_columns,
    bench_insert,
    bench_find,
    bench_text_search
);
criterion_main!(benches);
