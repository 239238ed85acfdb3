//! Region enumeration and factory instantiation benchmarks
//!
//! Toyota Way: Genchi Genbutsu (measure, don't guess)
//!
//! Run with: cargo bench --bench region_enumeration

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use trueno_lab::experiment::{Experiment, ExperimentFactory, ExperimentRegistry};
use trueno_lab::{Region, Value};

/// Square sweep: `dims` dimensions of `width` values each
fn sweep(dims: usize, width: i64) -> Region {
    (0..dims).fold(Region::new(), |r, d| r.add(format!("d{d}"), 0..width))
}

/// Benchmark Cartesian enumeration
fn bench_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("region_all");

    for (dims, width) in [(2, 32), (3, 16), (4, 8), (6, 4)] {
        let region = sweep(dims, width);
        group.bench_with_input(
            BenchmarkId::new(format!("{dims}d"), region.cardinality()),
            &region,
            |b, region| {
                b.iter(|| black_box(region).all());
            },
        );
    }

    // Non-rectangular region: predicate keeps roughly half the points
    let triangle = sweep(2, 64).with_predicate(|p| {
        let x = p.get("d0").and_then(Value::as_i64).unwrap_or(0);
        let y = p.get("d1").and_then(Value::as_i64).unwrap_or(0);
        x <= y
    });
    group.bench_function("predicate_triangle_4096", |b| {
        b.iter(|| black_box(&triangle).all());
    });

    group.finish();
}

/// Benchmark get-or-create through the factory cache
fn bench_factory(c: &mut Criterion) {
    let mut group = c.benchmark_group("factory_get_region");
    let region = sweep(3, 10);
    let factory = || {
        ExperimentFactory::new("noop").with_default_builder(|id| Ok(Experiment::from_fn(id, |_| Ok(()))))
    };

    group.bench_function("cold_1000", |b| {
        b.iter(|| {
            let registry = ExperimentRegistry::new();
            factory().get_region(black_box(&region), &registry)
        });
    });

    let warm = factory();
    let registry = ExperimentRegistry::new();
    let _ = warm.get_region(&region, &registry);
    group.bench_function("warm_1000", |b| {
        b.iter(|| warm.get_region(black_box(&region), &registry));
    });

    // Random point lookups against a warm cache
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);
    let points: Vec<_> = (0..256)
        .map(|_| {
            trueno_lab::Point::new()
                .with("d0", rng.gen_range(0..10_i64))
                .with("d1", rng.gen_range(0..10_i64))
                .with("d2", rng.gen_range(0..10_i64))
        })
        .collect();
    group.bench_function("warm_random_256", |b| {
        b.iter(|| {
            for point in &points {
                black_box(warm.get(point, &registry));
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_all, bench_factory);
criterion_main!(benches);
