//! Benchmarks for the full analysis pipeline.

use chartsignals::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Generate deterministic minute bars
fn generate_bars(n: usize) -> Vec<Bar> {
  let mut bars = Vec::with_capacity(n);
  let mut price = 100.0;

  for i in 0..n {
    let change = ((i * 7 + 13) % 100) as f64 / 50.0 - 1.0; // Deterministic "random"
    let volatility = 2.0 + ((i * 3) % 10) as f64 / 5.0;
    let volume = 1_000.0 + ((i * 11) % 17) as f64 * 150.0;

    let o = price;
    let c = (price + change).max(5.0);
    let h = o.max(c) + volatility * 0.5;
    let l = o.min(c) - volatility * 0.5;

    bars.push(Bar::new(i as i64 * 60_000, o, h, l, c, volume));
    price = c;
  }

  bars
}

fn bench_indicators_only(c: &mut Criterion) {
  let bars = generate_bars(1000);
  let engine = EngineBuilder::new().build().unwrap();
  let options = AnalysisOptions::new(
    Vec::<MatcherCategory>::new(),
    AnalysisOptions::default().indicators,
  );

  c.bench_function("indicators_1000_bars", |b| {
    b.iter(|| {
      let _ = black_box(engine.analyze(black_box(&bars), &options));
    })
  });
}

fn bench_full_pipeline(c: &mut Criterion) {
  let engine = EngineBuilder::new().build().unwrap();
  let options = AnalysisOptions::default();

  let mut group = c.benchmark_group("analyze");
  for size in [1000, 5000] {
    let bars = generate_bars(size);
    group.bench_with_input(BenchmarkId::from_parameter(size), &bars, |b, bars| {
      b.iter(|| {
        let _ = black_box(engine.analyze(black_box(bars), &options));
      })
    });
  }
  group.finish();
}

fn bench_parallel(c: &mut Criterion) {
  let engine = EngineBuilder::new().build().unwrap();
  let options = AnalysisOptions::default();
  let series: Vec<(String, Vec<Bar>)> =
    (0..8).map(|i| (format!("SYM{i}"), generate_bars(1000 + i * 100))).collect();

  c.bench_function("analyze_parallel_8_symbols", |b| {
    b.iter(|| {
      let instruments: Vec<(&str, &[Bar])> =
        series.iter().map(|(s, bars)| (s.as_str(), bars.as_slice())).collect();
      let _ = black_box(analyze_parallel(&engine, instruments, &options));
    })
  });
}

criterion_group!(benches, bench_indicators_only, bench_full_pipeline, bench_parallel);
criterion_main!(benches);
