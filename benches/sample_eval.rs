//! Sample Evaluation Benchmark
//!
//! Evaluates, integrates and differentiates a hyperelastic-style energy on
//! a rectilinear mesh, sequentially and in parallel.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use ndarray::arr1;
use std::hint::black_box;

use femsym::mesh::{self, Domain, PointsRule};
use femsym::{Argument, Eval, Expr, add, derivative, dot, multiply};

// =============================================================================
// Energy Generator
// =============================================================================

/// Builds a deep scalar energy of the coordinates and `u`, with heavy sharing
fn energy(geom: &Expr, u: &Argument, depth: usize) -> Expr {
    let mut f = dot(geom, &Expr::from(u), 0).unwrap();
    for i in 0..depth {
        let r = multiply(&f, &f).unwrap();
        f = add(&(r.sin() * 0.5), &(&f * (1.0 / (i + 1) as f64)).exp()).unwrap();
    }
    f
}

fn bench_sample_eval(c: &mut Criterion) {
    let (domain, geom) = mesh::rectilinear(&[64, 64]);
    let sample = domain.sample(PointsRule::Gauss, 4).unwrap();
    let u = Argument::new("u", [2]);
    let f = energy(&geom, &u, 12);
    let df = derivative(&f, &u).unwrap();
    let value = arr1(&[0.01, -0.02]);

    let mut group = c.benchmark_group("sample_eval_64x64");
    group.sample_size(20);

    for parallel in [false, true] {
        let label = if parallel { "parallel" } else { "sequential" };
        group.bench_with_input(BenchmarkId::new("eval", label), &parallel, |b, &parallel| {
            b.iter(|| {
                Eval::new(&sample)
                    .arg("u", value.clone())
                    .parallel(parallel)
                    .eval(black_box(&f))
                    .unwrap()
            })
        });
        group.bench_with_input(
            BenchmarkId::new("integrate_gradient", label),
            &parallel,
            |b, &parallel| {
                b.iter(|| {
                    Eval::new(&sample)
                        .arg("u", value.clone())
                        .parallel(parallel)
                        .integrate(black_box(&df))
                        .unwrap()
                })
            },
        );
    }

    group.bench_function("derivative", |b| {
        b.iter(|| derivative(black_box(&f), &u).unwrap())
    });

    for chunk_size in [256, 4096] {
        group.bench_with_input(
            BenchmarkId::new("chunk_size", chunk_size),
            &chunk_size,
            |b, &chunk_size| {
                b.iter(|| {
                    Eval::new(&sample)
                        .arg("u", value.clone())
                        .chunk_size(chunk_size)
                        .eval(black_box(&f))
                        .unwrap()
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_sample_eval);

criterion_main!(benches);
