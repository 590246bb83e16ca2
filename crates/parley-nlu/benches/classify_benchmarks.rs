//! Benchmarks for per-turn classification cost.
//!
//! Classification runs on every utterance, including follow-up re-scoring,
//! so it should stay well under a millisecond per call.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use parley_nlu::{EntityExtractor, IntentClassifier};

const UTTERANCES: &[&str] = &[
    "What's the weather in Seattle?",
    "What about tomorrow?",
    "Play some jazz",
    "Play something different",
    "Set a timer for 15 minutes",
    "what is fifteen plus twenty seven",
    "search for rust tutorials",
    "Tell me about Ada Lovelace",
    "play the news",
    "um, you know, could you maybe check my inbox for unread email from Alice Smith",
];

fn bench_classify(c: &mut Criterion) {
    let classifier = IntentClassifier::default();
    let extractor = EntityExtractor::deterministic_only();

    // Pre-extract so the classify benchmark measures scoring only.
    let prepared: Vec<_> = UTTERANCES
        .iter()
        .map(|u| (*u, extractor.extract_deterministic(u)))
        .collect();

    let mut group = c.benchmark_group("classification");
    group.sample_size(200);
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("classify_single", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let (text, entities) = &prepared[idx % prepared.len()];
            idx += 1;
            classifier.classify(text, entities)
        });
    });

    group.bench_function("extract_deterministic_single", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let text = UTTERANCES[idx % UTTERANCES.len()];
            idx += 1;
            extractor.extract_deterministic(text)
        });
    });

    group.bench_function("extract_and_classify_batch", |b| {
        b.iter(|| {
            UTTERANCES
                .iter()
                .map(|u| {
                    let entities = extractor.extract_deterministic(u);
                    classifier.classify(u, &entities)
                })
                .collect::<Vec<_>>()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_classify);
criterion_main!(benches);
