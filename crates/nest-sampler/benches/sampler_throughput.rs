use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use nest_core::RngHandle;
use nest_model::{ErrorDistribution, Model, PolynomialModel, Prior, Problem};
use nest_sampler::{NestedSampler, NestedSolver, SamplerConfig};

fn line_problem() -> Problem {
    let mut rng = RngHandle::from_seed(5);
    let xs: Vec<f64> = (0..50).map(|i| 0.2 * f64::from(i)).collect();
    let ys: Vec<f64> = xs.iter().map(|x| 1.0 + 0.5 * x + 0.3 * rng.normal()).collect();
    let model: Arc<dyn Model> =
        Arc::new(PolynomialModel::new(1).with_prior(Prior::uniform(-5.0, 5.0).unwrap()));
    Problem::classic(model, xs, ys).unwrap()
}

fn bench_config(threads: bool) -> SamplerConfig {
    let mut config = SamplerConfig::default();
    config.ensemble = 32;
    config.discard = 2;
    config.verbose = 0;
    config.threads = threads;
    config
}

fn bench_sampler(c: &mut Criterion) {
    for (name, threads) in [("sample_line_sequential", false), ("sample_line_threaded", true)] {
        c.bench_function(name, |b| {
            b.iter_batched(
                || {
                    NestedSampler::new(line_problem(), ErrorDistribution::gauss(0.3), bench_config(threads))
                        .unwrap()
                },
                |mut sampler| sampler.sample().unwrap(),
                BatchSize::SmallInput,
            )
        });
    }

    let mut rng = RngHandle::from_seed(9);
    let xs: Vec<f64> = (0..12).map(|_| rng.uniform()).collect();
    let ys: Vec<f64> = (0..12).map(|_| rng.uniform()).collect();
    c.bench_function("solve_twelve_city_tour", |b| {
        b.iter_batched(
            || {
                let problem = Problem::order(xs.clone(), ys.clone()).unwrap();
                NestedSolver::new(problem, bench_config(false)).unwrap()
            },
            |mut solver| solver.solve().unwrap(),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_sampler);
criterion_main!(benches);
