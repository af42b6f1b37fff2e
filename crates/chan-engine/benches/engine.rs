//! Benchmarks for the full structure pipeline.

use std::collections::HashMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use chan_core::{Bar, Timeframe};
use chan_engine::{Chan, ChanConfig, SegmentAlgorithm};

fn generate_test_bars(size: usize) -> Vec<Bar> {
    (0..size)
        .map(|i| {
            let t = i as f64;
            let close = 100.0 + (t * 0.05).sin() * 10.0 + (t * 0.31).sin() * 3.0;
            let open = close - (t * 0.7).cos();
            Bar::new(
                i as i64 * 60_000,
                open,
                open.max(close) + 0.5,
                open.min(close) - 0.5,
                close,
            )
        })
        .collect()
}

fn run(config: &ChanConfig, bars: &[Bar]) -> usize {
    let mut chan = Chan::new(config.clone(), &[Timeframe::Minute1]).unwrap();
    let snapshot = chan
        .push(HashMap::from([(Timeframe::Minute1, bars.to_vec())]))
        .unwrap();
    snapshot.levels[0].strokes
}

fn benchmark_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("Batch");

    for size in [1000, 10000, 50000].iter() {
        let bars = generate_test_bars(*size);

        group.bench_with_input(BenchmarkId::new("chan", size), &bars, |b, bars| {
            let config = ChanConfig::default();
            b.iter(|| run(&config, black_box(bars)))
        });

        group.bench_with_input(BenchmarkId::new("break", size), &bars, |b, bars| {
            let mut config = ChanConfig::default();
            config.segment.algorithm = SegmentAlgorithm::Break;
            b.iter(|| run(&config, black_box(bars)))
        });
    }

    group.finish();
}

fn benchmark_stepwise(c: &mut Criterion) {
    let mut group = c.benchmark_group("Stepwise");
    group.sample_size(10);

    for size in [1000, 5000].iter() {
        let bars = generate_test_bars(*size);

        group.bench_with_input(BenchmarkId::new("push_each", size), &bars, |b, bars| {
            b.iter(|| {
                let mut chan = Chan::new(ChanConfig::default(), &[Timeframe::Minute1])
                    .unwrap();
                for bar in bars {
                    let _ = chan.push(HashMap::from([(Timeframe::Minute1, vec![*bar])]));
                }
                chan.step_count()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_batch, benchmark_stepwise);
criterion_main!(benches);
