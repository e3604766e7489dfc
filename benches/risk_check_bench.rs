//! Pre-trade risk engine benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hft_mm_core::risk::{RiskEngine, RiskLimits};
use hft_mm_core::types::{Order, Trade};
use hft_mm_core::Symbol;
use rust_decimal_macros::dec;
use std::time::Duration;

fn permissive_limits() -> RiskLimits {
    RiskLimits {
        max_gross_position: 1e9,
        max_net_position: 1e9,
        max_dollar_exposure: 1e12,
        var_limit: 1e9,
        es_limit: 1e9,
        max_drawdown_limit: 1.0,
        max_position_duration: Duration::from_secs(3600),
        max_order_size: 1e9,
        max_daily_loss: 1e9,
        max_daily_trades: 1_000_000,
    }
}

fn bench_check_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_order");
    group.significance_level(0.01).sample_size(5000);

    let engine = RiskEngine::new();
    let sym = Symbol::new("AAPL");
    engine.set_risk_limits(sym.clone(), permissive_limits());
    let order = Order::new(sym, dec!(100), dec!(1), true);

    group.bench_function("pass", |b| {
        b.iter(|| black_box(engine.check_order(black_box(&order))));
    });

    group.finish();
}

fn bench_update_position(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_position");
    group.significance_level(0.01).sample_size(5000);

    let engine = RiskEngine::new();
    let sym = Symbol::new("AAPL");
    engine.set_risk_limits(sym.clone(), permissive_limits());

    let mut is_buy = true;
    group.bench_function("alternating_fills", |b| {
        b.iter(|| {
            let trade = Trade::new(sym.clone(), dec!(100), dec!(1), is_buy);
            is_buy = !is_buy;
            engine.update_position(black_box(&sym), black_box(trade));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_check_order, bench_update_position);
criterion_main!(benches);
