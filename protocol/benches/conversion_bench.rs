// Fixed-point conversion benchmarks for the Ballast protocol.
//
// Every balance read, transfer and redemption goes through these helpers,
// so the narrow (u128) and wide (256-bit) paths of `mul_div_down` are
// measured separately.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use ballast_protocol::config::PRECISION;
use ballast_protocol::math::{amount_for_shares, mul_div_down, normalize, shares_for_amount};

fn bench_mul_div_paths(c: &mut Criterion) {
    let mut group = c.benchmark_group("mul_div_down");

    // Fits in u128: the fast path.
    group.bench_function("narrow", |b| {
        b.iter(|| mul_div_down(black_box(1_000 * PRECISION), black_box(PRECISION), black_box(3)));
    });

    // 10^30 × 1.05e18 overflows u128: the U256 path.
    group.bench_function("wide", |b| {
        b.iter(|| {
            mul_div_down(
                black_box(10u128.pow(30)),
                black_box(PRECISION + PRECISION / 20),
                black_box(PRECISION),
            )
        });
    });

    group.finish();
}

fn bench_share_conversions(c: &mut Criterion) {
    let mut group = c.benchmark_group("share_conversion");
    let nav = PRECISION + PRECISION / 37;

    for supply_units in [1u128, 1_000, 1_000_000_000] {
        let amount = supply_units * PRECISION;
        group.bench_with_input(
            BenchmarkId::new("amount_to_shares_to_amount", supply_units),
            &amount,
            |b, &amount| {
                b.iter(|| {
                    let shares = shares_for_amount(black_box(amount), nav).unwrap();
                    amount_for_shares(shares, nav).unwrap()
                });
            },
        );
    }

    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    c.bench_function("normalize/6_decimals", |b| {
        b.iter(|| normalize(black_box(1_234_567_890), black_box(6)));
    });
}

criterion_group!(
    benches,
    bench_mul_div_paths,
    bench_share_conversions,
    bench_normalize
);
criterion_main!(benches);
