//! Benchmarks for streaming indicator updates.

use chan_core::traits::StreamingIndicator;
use chan_indicators::{Macd, Rsi};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn generate_test_data(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 100.0 + (i as f64 * 0.1).sin() * 10.0)
        .collect()
}

fn benchmark_macd(c: &mut Criterion) {
    let mut group = c.benchmark_group("MACD");

    for size in [1000, 10000, 100000].iter() {
        let data = generate_test_data(*size);

        group.bench_with_input(BenchmarkId::new("streaming", size), &data, |b, data| {
            b.iter(|| {
                let mut macd = Macd::new();
                for &v in data {
                    black_box(macd.update(v));
                }
            })
        });
    }

    group.finish();
}

fn benchmark_rsi(c: &mut Criterion) {
    let mut group = c.benchmark_group("RSI");

    for size in [1000, 10000, 100000].iter() {
        let data = generate_test_data(*size);

        group.bench_with_input(BenchmarkId::new("streaming", size), &data, |b, data| {
            b.iter(|| {
                let mut rsi = Rsi::new(14);
                for &v in data {
                    black_box(rsi.update(v));
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_macd, benchmark_rsi);
criterion_main!(benches);
