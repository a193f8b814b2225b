use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mixeval_core::dataset::{DatasetRecord, LoadedDataset, Subset};
use mixeval_core::sampler::{allocate, sample, SamplerConfig, SamplingStrategy};
use mixeval_core::schema::{DatasetArgs, FlatDataset};

fn dataset(name: &str, weight: f64, size: usize) -> (FlatDataset, LoadedDataset) {
    let info = FlatDataset {
        name: name.into(),
        weight,
        task_type: "default".into(),
        tags: vec![],
        hierarchy: vec!["bench".into()],
        args: DatasetArgs::default(),
    };
    let records = (0..size)
        .map(|i| DatasetRecord {
            id: format!("{name}-{i}"),
            question: format!("question {i}"),
            choices: vec![],
            answer: i.to_string(),
            metadata: serde_json::Value::Null,
        })
        .collect();
    let data = LoadedDataset {
        name: name.into(),
        subsets: vec![Subset {
            name: "default".into(),
            records,
        }],
    };
    (info, data)
}

fn bench_allocate(c: &mut Criterion) {
    let weights: Vec<f64> = (1..=50).map(|w| w as f64).collect();
    c.bench_function("allocate_50_datasets", |b| {
        b.iter(|| allocate(black_box(&weights), black_box(10_000)))
    });
}

fn bench_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("sample");
    let datasets = vec![
        dataset("small", 0.2, 200),
        dataset("medium", 0.3, 2_000),
        dataset("large", 0.5, 20_000),
    ];

    for strategy in [
        SamplingStrategy::Weighted,
        SamplingStrategy::Stratified,
        SamplingStrategy::Uniform,
    ] {
        let config = SamplerConfig {
            strategy,
            count: 1_000,
            ..Default::default()
        };
        group.bench_function(strategy.to_string(), |b| {
            b.iter(|| sample(black_box(&datasets), black_box(&config)))
        });
    }

    let oversample = SamplerConfig {
        count: 5_000,
        strategy: SamplingStrategy::Uniform,
        ..Default::default()
    };
    group.bench_function("with_replacement", |b| {
        b.iter(|| sample(black_box(&datasets), black_box(&oversample)))
    });

    group.finish();
}

criterion_group!(benches, bench_allocate, bench_sample);
criterion_main!(benches);
