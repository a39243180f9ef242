//! Benchmarks for the processing hot path
//!
//! - Address parsing
//! - Envelope splitting
//! - `Processor::service` over a fan-out of recipients
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{hint::black_box, sync::Arc};

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use postroom_common::{AttributeValue, Envelope, MailAddress, State};
use postroom_processor::{
    Processor, Stage,
    mailet::builtin::{Null, SetAttribute, ToProcessor},
    matcher::builtin::{All, HostIs, RecipientIs},
};
use postroom_spool::MemorySpool;

fn recipients(count: usize) -> Vec<MailAddress> {
    (0..count)
        .map(|i| {
            let domain = if i % 2 == 0 { "example.com" } else { "example.org" };
            MailAddress::parse(&format!("user{i}@{domain}")).expect("Valid address")
        })
        .collect()
}

fn envelope(count: usize) -> Envelope {
    Envelope::new(
        Some(MailAddress::parse("sender@example.net").expect("Valid address")),
        recipients(count),
        "Subject: benchmark\r\n\r\nbody",
    )
    .expect("Valid envelope")
}

// ============================================================================
// Address Benchmarks
// ============================================================================

fn bench_address_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("address_parsing");

    group.bench_function("plain", |b| {
        b.iter(|| MailAddress::parse(black_box("alice@mail.example.com")));
    });

    group.bench_function("bracketed", |b| {
        b.iter(|| MailAddress::parse(black_box("<alice@mail.example.com>")));
    });

    group.bench_function("quoted", |b| {
        b.iter(|| MailAddress::parse(black_box("\"alice smith\"@example.com")));
    });

    group.finish();
}

// ============================================================================
// Envelope Benchmarks
// ============================================================================

fn bench_envelope_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("envelope_split");

    for count in [2, 10, 100] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let envelope = envelope(count);
                    let matched = envelope.recipients()[..count / 2].to_vec();
                    (envelope, matched)
                },
                |(mut envelope, matched)| black_box(envelope.split(&matched)),
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

// ============================================================================
// Processor Benchmarks
// ============================================================================

fn processor(spool: &MemorySpool) -> Processor {
    let processor = Processor::new(State::ROOT, Arc::new(spool.clone()));
    processor
        .add(Stage::new(
            All,
            SetAttribute::new([("benchmark".to_string(), AttributeValue::Bool(true))]),
        ))
        .unwrap();
    processor
        .add(Stage::new(RecipientIs::from_addresses(recipients(1)), Null))
        .unwrap();
    processor
        .add(Stage::new(
            HostIs::from_hosts(["example.org"]),
            ToProcessor::new(State::GHOST),
        ))
        .unwrap();
    processor.close().unwrap();
    processor
}

fn bench_processor_service(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");
    let mut group = c.benchmark_group("processor_service");

    for count in [1, 10, 100] {
        let spool = MemorySpool::new();
        let processor = &processor(&spool);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.to_async(&runtime).iter_batched(
                || envelope(count),
                |envelope| async move {
                    let report = processor.service(envelope).await.expect("Service failed");
                    black_box(report)
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_address_parsing,
    bench_envelope_split,
    bench_processor_service
);
criterion_main!(benches);
