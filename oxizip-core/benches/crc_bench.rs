//! CRC-32 throughput benchmarks.
//!
//! Compares single-shot and chunked updates across sizes on either side of
//! the slicing-by-8 threshold.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use oxizip_core::crc::Crc32;
use std::hint::black_box;

fn pseudo_random(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut seed: u64 = 0x123456789ABCDEF0;
    for _ in 0..size {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        data.push((seed >> 32) as u8);
    }
    data
}

fn bench_crc32_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc32_sizes");

    for (label, size) in [
        ("15B", 15usize),
        ("256B", 256),
        ("64KB", 64 * 1024),
        ("1MB", 1024 * 1024),
    ] {
        let data = pseudo_random(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), &data, |b, data| {
            b.iter(|| Crc32::compute(black_box(data)))
        });
    }

    group.finish();
}

fn bench_crc32_chunked(c: &mut Criterion) {
    let mut group = c.benchmark_group("crc32_chunked_1MB");
    let data = pseudo_random(1024 * 1024);
    group.throughput(Throughput::Bytes(data.len() as u64));

    for chunk in [64usize, 4096, 512 * 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let mut crc = Crc32::new();
                for part in data.chunks(chunk) {
                    crc.update(black_box(part));
                }
                crc.finalize()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_crc32_sizes, bench_crc32_chunked);
criterion_main!(benches);
