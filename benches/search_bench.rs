//! Benchmarks for scoring, candidate generation and search.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::cast_precision_loss,
    missing_docs
)]

use std::sync::Arc;

use arrow::{
    array::{Int64Array, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use datarepair::{
    quality::{Constraint, FunctionalDependency},
    solve, ArrowDataset, ParameterSampler, SearchConfig, SolverConfig, TreeSearch,
};

const CITIES: &[&str] = &["Boston", "Albany", "Chicago", "Denver", "Austin"];

/// `rows` rows over five zip groups, with one typo per group.
fn create_batch(rows: usize) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![
        Field::new("state", DataType::Utf8, true),
        Field::new("zip", DataType::Int64, true),
        Field::new("city", DataType::Utf8, true),
    ]));

    let groups: Vec<usize> = (0..rows).map(|i| i % CITIES.len()).collect();
    let zips: Vec<i64> = groups.iter().map(|g| 10_000 + *g as i64).collect();
    let states: Vec<&str> = groups
        .iter()
        .map(|g| if *g < 2 { "east" } else { "west" })
        .collect();
    let cities: Vec<String> = groups
        .iter()
        .enumerate()
        .map(|(i, g)| {
            if i < CITIES.len() {
                format!("{}x", CITIES[*g])
            } else {
                CITIES[*g].to_string()
            }
        })
        .collect();

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(states)),
            Arc::new(Int64Array::from(zips)),
            Arc::new(StringArray::from(cities)),
        ],
    )
    .expect("Failed to create batch")
}

fn fd() -> Constraint {
    Constraint::atom(FunctionalDependency::new(["zip"], ["city"]))
}

fn bench_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("fd_scoring");

    for rows in [100, 1000, 10000] {
        let batch = create_batch(rows);
        let constraint = fd();
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(rows), &batch, |b, batch| {
            b.iter(|| constraint.total(black_box(batch)).unwrap());
        });
    }

    group.finish();
}

fn bench_sampler(c: &mut Criterion) {
    let mut group = c.benchmark_group("candidate_generation");
    let config = SearchConfig::default();
    let templates = config.resolve_templates();

    for rows in [100, 1000] {
        let batch = create_batch(rows);
        let constraint = fd();
        let scores = constraint.evaluate(&batch).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(rows), &batch, |b, batch| {
            b.iter(|| {
                let sampler =
                    ParameterSampler::new(black_box(batch), &constraint, Some(&scores), &config)
                        .unwrap();
                sampler.candidates(&templates).len()
            });
        });
    }

    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_search");
    group.sample_size(10);
    let search = TreeSearch::new(&SearchConfig::default().with_depth(6)).unwrap();

    for rows in [50, 200] {
        let batch = create_batch(rows);
        let constraint = fd();
        group.bench_with_input(BenchmarkId::from_parameter(rows), &batch, |b, batch| {
            b.iter(|| search.run(black_box(batch), &constraint).unwrap().cost);
        });
    }

    group.finish();
}

fn bench_partitioned_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("partitioned_solve");
    group.sample_size(10);
    let dataset = ArrowDataset::from_batch(create_batch(200)).unwrap();
    let config = SolverConfig::default();
    let dependencies = [fd()];

    group.bench_function("unpartitioned", |b| {
        b.iter(|| solve(black_box(&dataset), &[], &dependencies, None, &config).unwrap());
    });
    group.bench_function("by_state", |b| {
        b.iter(|| solve(black_box(&dataset), &[], &dependencies, Some("state"), &config).unwrap());
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_scoring,
    bench_sampler,
    bench_search,
    bench_partitioned_solve
);
criterion_main!(benches);
