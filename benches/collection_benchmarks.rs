// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//! Performance benchmarks for ModelFree collections

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use tokio::runtime::Runtime;

use modelfree_backend::{
    Backend, KeyGenerator, MemoryBackend, MetricsBackend, RandomKeyGenerator, SeededKeyGenerator,
};
use modelfree_store::ModelFree;

// ============================================================================
// Key Generation Benchmarks
// ============================================================================

fn bench_key_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("keygen");

    for length in [8usize, 31, 64, 128] {
        group.throughput(Throughput::Bytes(length as u64));
        group.bench_with_input(BenchmarkId::new("random", length), &length, |b, &length| {
            let generator = RandomKeyGenerator::new();
            b.iter(|| black_box(generator.generate(length)));
        });
        group.bench_with_input(BenchmarkId::new("seeded", length), &length, |b, &length| {
            let generator = SeededKeyGenerator::new(42);
            b.iter(|| black_box(generator.generate(length)));
        });
    }

    group.finish();
}

// ============================================================================
// Memory Backend Benchmarks
// ============================================================================

async fn filled_backend(size: usize) -> MemoryBackend {
    let backend = MemoryBackend::new();
    for i in 0..size {
        backend
            .upsert("widgets", &format!("w{i}"), &json!({"name": format!("widget {i}"), "n": i}))
            .await
            .unwrap();
    }
    backend
}

fn bench_memory_upsert(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("memory");

    group.bench_function("upsert_new_key", |b| {
        let backend = MemoryBackend::new();
        let generator = SeededKeyGenerator::new(1);
        b.to_async(&rt).iter(|| async {
            let key = generator.generate(31);
            black_box(backend.upsert("widgets", &key, &json!({"name": "w"})).await.unwrap())
        });
    });

    group.bench_function("upsert_existing_key", |b| {
        let backend = rt.block_on(filled_backend(1000));
        b.to_async(&rt).iter(|| async {
            black_box(backend.upsert("widgets", "w500", &json!({"name": "w"})).await.unwrap())
        });
    });

    group.finish();
}

fn bench_memory_reads(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("memory_reads");

    for size in [100usize, 1000, 10_000] {
        let backend = rt.block_on(filled_backend(size));
        let target = format!("w{}", size / 2);

        group.bench_with_input(BenchmarkId::new("get_by_key", size), &size, |b, _| {
            b.to_async(&rt)
                .iter(|| async { black_box(backend.get_by_key("widgets", &target).await.unwrap()) });
        });
        group.bench_with_input(BenchmarkId::new("random_one", size), &size, |b, _| {
            b.to_async(&rt)
                .iter(|| async { black_box(backend.random_one("widgets").await.unwrap()) });
        });
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("all", size), &size, |b, _| {
            b.to_async(&rt)
                .iter(|| async { black_box(backend.all("widgets").await.unwrap()) });
        });
    }

    group.finish();
}

// ============================================================================
// Document Layer Benchmarks
// ============================================================================

fn bench_collection_create(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("collection");

    group.bench_function("create_document", |b| {
        let mf = ModelFree::new(MemoryBackend::new());
        let widgets = mf.collection("widgets").unwrap();
        b.to_async(&rt).iter(|| async {
            black_box(widgets.create(json!({"name": "my widget"})).await.unwrap())
        });
    });

    group.bench_function("create_document_metered", |b| {
        let mf = ModelFree::new(MetricsBackend::new(MemoryBackend::new()));
        let widgets = mf.collection("widgets").unwrap();
        b.to_async(&rt).iter(|| async {
            black_box(widgets.create(json!({"name": "my widget"})).await.unwrap())
        });
    });

    group.finish();
}

criterion_group!(keygen_benches, bench_key_generation);

criterion_group!(memory_benches, bench_memory_upsert, bench_memory_reads);

criterion_group!(collection_benches, bench_collection_create);

criterion_main!(keygen_benches, memory_benches, collection_benches);
