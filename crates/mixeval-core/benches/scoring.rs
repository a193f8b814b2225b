use criterion::{black_box, criterion_group, criterion_main, Criterion};

use mixeval_core::dataset::DatasetRecord;
use mixeval_core::scoring::{extract_answer, score, Metric};

fn record(answer: &str, choices: &[&str]) -> DatasetRecord {
    DatasetRecord {
        id: "bench".into(),
        question: "bench question".into(),
        choices: choices.iter().map(|c| c.to_string()).collect(),
        answer: answer.into(),
        metadata: serde_json::Value::Null,
    }
}

const LONG_REASONING: &str = "Natalia sold 48 clips in April. In May she sold half as many, \
which is 48 / 2 = 24 clips. Altogether she sold 48 + 24 = 72 clips in April and May.\n\
So the answer is 72.\n#### 72";

fn bench_extract_answer(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract_answer");

    group.bench_function("numeric_marker", |b| {
        b.iter(|| extract_answer(Metric::Numeric, black_box(LONG_REASONING), 0))
    });

    group.bench_function("multiple_choice", |b| {
        let response = "Plants need light to make food. Answer: (C)";
        b.iter(|| extract_answer(Metric::MultipleChoice, black_box(response), 4))
    });

    group.bench_function("exact_match_last_line", |b| {
        let response = "Let me think.\nThe capital of France is Paris.\nParis";
        b.iter(|| extract_answer(Metric::ExactMatch, black_box(response), 0))
    });

    group.finish();
}

fn bench_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("score");

    group.bench_function("numeric", |b| {
        let gold = record("72", &[]);
        b.iter(|| score(Metric::Numeric, black_box("72.0"), black_box(&gold)))
    });

    group.bench_function("multiple_choice", |b| {
        let gold = record("C", &["roots", "soil", "sunlight", "wind"]);
        b.iter(|| score(Metric::MultipleChoice, black_box("C"), black_box(&gold)))
    });

    group.bench_function("f1", |b| {
        let gold = record("the treaty of versailles in 1919", &[]);
        b.iter(|| {
            score(
                Metric::F1,
                black_box("it was the treaty of versailles, signed 1919"),
                black_box(&gold),
            )
        })
    });

    group.finish();
}

criterion_group!(benches, bench_extract_answer, bench_score);
criterion_main!(benches);
