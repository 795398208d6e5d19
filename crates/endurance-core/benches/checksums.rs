//! Benchmarks for unit digests.
//!
//! Run with: cargo bench -p endurance-core

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use endurance_core::checksum::{digest, digest_bytes, DigestBuilder};
use std::hint::black_box;
use std::io::Cursor;

/// Generate test data of the specified size
fn generate_test_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 256) as u8).collect()
}

/// Streaming digest vs one-shot digest for several data sizes
fn bench_digest(c: &mut Criterion) {
    let mut group = c.benchmark_group("digest");

    let sizes = [
        (64 * 1024, "64KB"),
        (1024 * 1024, "1MB"),
        (16 * 1024 * 1024, "16MB"),
    ];

    for (size, size_name) in sizes {
        let data = generate_test_data(size);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("one-shot", size_name), &data, |b, data| {
            b.iter(|| digest_bytes(black_box(data)));
        });

        group.bench_with_input(BenchmarkId::new("streamed", size_name), &data, |b, data| {
            b.iter(|| {
                let mut cursor = Cursor::new(data);
                digest(black_box(&mut cursor), 1024 * 1024).unwrap()
            });
        });
    }

    group.finish();
}

/// Read-back chunk size against a fixed 16MB unit
fn bench_chunk_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_size");

    let data_size = 16 * 1024 * 1024;
    let data = generate_test_data(data_size);

    let chunk_sizes = [
        (4 * 1024, "4KB"),
        (64 * 1024, "64KB"),
        (1024 * 1024, "1MB"),
        (4 * 1024 * 1024, "4MB"),
    ];

    group.throughput(Throughput::Bytes(data_size as u64));

    for (chunk_size, chunk_name) in chunk_sizes {
        group.bench_with_input(
            BenchmarkId::new("SHA-256", chunk_name),
            &chunk_size,
            |b, &chunk_size| {
                b.iter(|| {
                    let mut cursor = Cursor::new(&data);
                    digest(black_box(&mut cursor), chunk_size).unwrap()
                });
            },
        );
    }

    group.finish();
}

/// Hashing while generating, as the writer does
fn bench_incremental(c: &mut Criterion) {
    let mut group = c.benchmark_group("incremental");
    let data = generate_test_data(16 * 1024 * 1024);
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("1MB chunks", |b| {
        b.iter(|| {
            let mut builder = DigestBuilder::new();
            for chunk in data.chunks(1024 * 1024) {
                builder.update(black_box(chunk));
            }
            builder.finish()
        });
    });

    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(50);
    targets = bench_digest, bench_chunk_sizes, bench_incremental
}
criterion_main!(benches);
