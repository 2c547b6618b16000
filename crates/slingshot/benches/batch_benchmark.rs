//! Benchmarks for batching, transforms and mapping merges.
//!
//! Run with: cargo bench -p slingshot

#![allow(clippy::pedantic)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use std::sync::Arc;

use slingshot::batch::BatchAccumulator;
use slingshot::config::BulkConfig;
use slingshot::mapping::merge_mapping;
use slingshot::transform::{SplitConfig, TransformConfig};
use slingshot::{
    BulkAction, Document, DocumentRecord, Endpoint, FieldTransformer, Identity, MemoryStore,
    MigrationSpec, Pipeline, Transform, TransformResult,
};

fn sample_doc(i: usize) -> Document {
    json!({
        "id": i,
        "title": format!("Product {}", i),
        "price": (i as f64) * 1.5,
        "tags": ["a", "b", "c"],
        "bus": [{"id": i * 10, "bu": "fr"}, {"id": i * 10 + 1, "bu": "uk"}]
    })
    .as_object()
    .cloned()
    .unwrap_or_default()
}

/// Benchmark grouping transform results into bulk batches
fn bench_accumulate(c: &mut Criterion) {
    let mut group = c.benchmark_group("accumulate_by_batch_size");
    for max in [100, 500, 1000] {
        group.bench_with_input(BenchmarkId::new("max_batch_size", max), &max, |b, &max| {
            let bulk = BulkConfig {
                action: BulkAction::Index,
                max_batch_size: Some(max),
            };
            b.iter(|| {
                let mut acc = BatchAccumulator::new(Endpoint::new("target"), &bulk);
                for i in 0..5_000 {
                    acc.add(TransformResult::single(sample_doc(i)), &i.to_string());
                }
                black_box(acc.pending())
            })
        });
    }
    group.finish();
}

/// Benchmark the config-driven transformer
fn bench_field_transformer(c: &mut Criterion) {
    let mut config = TransformConfig::default();
    config.rename.insert("title".to_string(), "name".to_string());
    config.remove.push("tags".to_string());
    let mut reshape = FieldTransformer::new(config.clone());

    config.split = Some(SplitConfig {
        field: "bus".to_string(),
        id_field: Some("id".to_string()),
    });
    let mut split = FieldTransformer::new(config);

    c.bench_function("field_transformer_reshape", |b| {
        b.iter(|| {
            let record = DocumentRecord::new("1", sample_doc(1));
            black_box(reshape.apply(record).map(|r| r.op_count()).unwrap_or(0))
        })
    });

    c.bench_function("field_transformer_split", |b| {
        b.iter(|| {
            let record = DocumentRecord::new("1", sample_doc(1));
            black_box(split.apply(record).map(|r| r.op_count()).unwrap_or(0))
        })
    });
}

/// Benchmark recursive mapping merge
fn bench_merge_mapping(c: &mut Criterion) {
    let base: Document = (0..200)
        .map(|i| (format!("field_{}", i), json!({"type": "keyword", "index": true})))
        .collect();
    let base = json!({ "properties": base }).as_object().cloned().unwrap_or_default();
    let overrides = json!({
        "properties": { "field_7": {"type": "text"}, "extra": {"type": "long"} }
    })
    .as_object()
    .cloned()
    .unwrap_or_default();

    c.bench_function("merge_mapping_200_fields", |b| {
        b.iter(|| {
            let mut merged = base.clone();
            merge_mapping(&mut merged, &overrides);
            black_box(merged.len())
        })
    });
}

/// Benchmark a full in-memory migration
fn bench_pipeline(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let source = Arc::new(MemoryStore::new());
    for i in 0..10_000 {
        source.insert("source", format!("{:06}", i), sample_doc(i));
    }

    let mut spec = MigrationSpec::new("source", "target");
    spec.bulk.max_batch_size = Some(500);

    c.bench_function("pipeline_memory_10k", |b| {
        b.to_async(&runtime).iter(|| {
            let source = Arc::clone(&source);
            let spec = spec.clone();
            async move {
                let target = Arc::new(MemoryStore::new());
                target.create("target");
                let stats = Pipeline::new(source, target, spec)
                    .run(&mut Identity)
                    .await
                    .map(|s| s.docs_written)
                    .unwrap_or(0);
                black_box(stats)
            }
        })
    });
}

criterion_group!(
    benches,
    bench_accumulate,
    bench_field_transformer,
    bench_merge_mapping,
    bench_pipeline
);
criterion_main!(benches);
