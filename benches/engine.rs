//! Benchmarks for band computation, signals, rating and scanning.

use bbscan::prelude::*;
use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Generate deterministic daily bars
fn generate_bars(n: usize) -> Vec<PricePoint> {
  let start = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap();
  let mut bars = Vec::with_capacity(n);
  let mut price = 100.0;

  for i in 0..n {
    let change = ((i * 7 + 13) % 100) as f64 / 50.0 - 1.0; // Deterministic "random"
    let range = 2.0 + ((i * 3) % 10) as f64 / 5.0;

    let o = price;
    let c = (price + change).max(5.0);
    let h = o.max(c) + range * 0.5;
    let l = (o.min(c) - range * 0.5).max(1.0);
    let v = 10_000.0 + ((i * 11) % 17) as f64 * 500.0;

    bars.push(PricePoint::new(start + chrono::Days::new(i as u64), o, h, l, c, v));
    price = c;
  }

  bars
}

fn bench_compute(c: &mut Criterion) {
  let bars = generate_bars(1000);
  let engine = BandEngine::with_defaults().unwrap();

  c.bench_function("compute_1000_bars", |b| {
    b.iter(|| {
      let _ = black_box(engine.compute(black_box(&bars)));
    })
  });
}

fn bench_calculate_next(c: &mut Criterion) {
  let bars = generate_bars(1000);
  let engine = BandEngine::with_defaults().unwrap();
  let observations = engine.compute(&bars[..999]);
  let closes: Vec<f64> = bars[..999].iter().map(|b| b.close).collect();
  let bandwidths: Vec<f64> = observations.iter().map(|o| o.bandwidth).collect();
  let last = bars[999];

  c.bench_function("calculate_next_live_quote", |b| {
    b.iter(|| {
      let _ = black_box(calculate_next(
        black_box(&closes),
        last.date,
        black_box(last.close),
        black_box(&bandwidths),
        &engine.config().bands,
      ));
    })
  });
}

fn bench_scaling(c: &mut Criterion) {
  let engine = BandEngine::with_defaults().unwrap();

  let mut group = c.benchmark_group("scaling");

  for size in [100, 500, 1000, 5000].iter() {
    let bars = generate_bars(*size);

    group.bench_with_input(BenchmarkId::new("compute", size), size, |b, _| {
      b.iter(|| {
        let _ = black_box(engine.compute(black_box(&bars)));
      })
    });
  }

  group.finish();
}

fn bench_signals(c: &mut Criterion) {
  let bars = generate_bars(1000);
  let engine = BandEngine::with_defaults().unwrap();

  c.bench_function("generate_signals_1000_bars", |b| {
    b.iter(|| {
      let _ = black_box(engine.generate_signals("SYM", black_box(&bars)));
    })
  });
}

fn bench_rate_all(c: &mut Criterion) {
  let histories: Vec<Vec<PricePoint>> = (0..50).map(|i| generate_bars(500 + i * 3)).collect();
  let names: Vec<String> = (0..histories.len()).map(|i| format!("SYM{i}")).collect();
  let engine = BandEngine::with_defaults().unwrap();

  let instruments: Vec<(&str, &[PricePoint])> =
    names.iter().zip(&histories).map(|(n, h)| (n.as_str(), h.as_slice())).collect();

  c.bench_function("rate_all_50_instruments", |b| {
    b.iter(|| {
      let _ = black_box(engine.rate_all(black_box(instruments.clone())));
    })
  });
}

fn bench_scanners(c: &mut Criterion) {
  let engine = BandEngine::with_defaults().unwrap();
  let histories: Vec<Vec<BandObservation>> =
    (0..50).map(|i| engine.compute(&generate_bars(400 + i * 5))).collect();
  let names: Vec<String> = (0..histories.len()).map(|i| format!("SYM{i}")).collect();

  let instruments: Vec<(&str, &[BandObservation])> =
    names.iter().zip(&histories).map(|(n, h)| (n.as_str(), h.as_slice())).collect();

  let mut group = c.benchmark_group("scan");

  for kind in ScannerKind::ALL {
    group.bench_with_input(BenchmarkId::from_parameter(kind), &kind, |b, &kind| {
      b.iter(|| {
        let _ = black_box(engine.run_scan(kind, black_box(instruments.clone())));
      })
    });
  }

  group.finish();
}

criterion_group!(
  benches,
  bench_compute,
  bench_calculate_next,
  bench_scaling,
  bench_signals,
  bench_rate_all,
  bench_scanners,
);

criterion_main!(benches);
