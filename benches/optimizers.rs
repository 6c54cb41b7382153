use std::hint::black_box;
use std::time::Duration;

use chrono::Duration as Days;
use chrono::NaiveDate;
use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use frontier_rs::portfolio::Objective;
use frontier_rs::portfolio::PortfolioEngine;
use frontier_rs::portfolio::PortfolioEngineConfig;
use frontier_rs::portfolio::PriceTable;
use frontier_rs::portfolio::Universe;

/// Deterministic price paths with asset-specific drift, volatility and phase.
fn synthetic_prices(assets: usize, days: usize) -> PriceTable {
  let universe = Universe::new((0..assets).map(|i| format!("A{i:03}"))).unwrap();
  let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
  let dates = (0..days).map(|t| start + Days::days(t as i64)).collect();

  let mut level = vec![100.0f64; assets];
  let rows = (0..days)
    .map(|t| {
      if t > 0 {
        for (i, p) in level.iter_mut().enumerate() {
          let drift = 2e-4 * (1.0 + (i % 7) as f64);
          let vol = 0.005 + 0.001 * (i % 5) as f64;
          let common = (t as f64 * 0.37).sin();
          let own = (t as f64 * (0.11 + 0.013 * i as f64) + i as f64).sin();
          *p *= 1.0 + drift + vol * (0.5 * common + own);
        }
      }
      level.iter().map(|&p| Some(p)).collect()
    })
    .collect();

  PriceTable::new(universe, dates, rows).unwrap()
}

fn bench_optimizers(c: &mut Criterion) {
  let mut group = c.benchmark_group("Optimizers");
  group.measurement_time(Duration::from_secs(5));
  group.warm_up_time(Duration::from_millis(500));
  group.sample_size(20);

  let engine = PortfolioEngine::new(PortfolioEngineConfig {
    risk_free_rate: 0.01,
    ..Default::default()
  });

  for &n in &[10usize, 44] {
    let prices = synthetic_prices(n, 756);
    let estimates = engine.estimate(&prices).unwrap();

    group.bench_with_input(BenchmarkId::new("estimate", n), &prices, |b, prices| {
      b.iter(|| black_box(engine.estimate(prices).unwrap()))
    });

    group.bench_with_input(BenchmarkId::new("min_variance", n), &estimates, |b, est| {
      b.iter(|| black_box(engine.optimize(est, Objective::MinimizeVariance).unwrap()))
    });

    group.bench_with_input(BenchmarkId::new("max_sharpe", n), &estimates, |b, est| {
      b.iter(|| {
        black_box(
          engine
            .optimize(
              est,
              Objective::MaximizeSharpe {
                risk_free_rate: 0.01,
              },
            )
            .unwrap(),
        )
      })
    });
  }

  group.finish();
}

criterion_group!(benches, bench_optimizers);
criterion_main!(benches);
