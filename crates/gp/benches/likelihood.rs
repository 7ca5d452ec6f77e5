use autokernel_gp::{BaseKernelKind, CholeskyLikelihood, KernelExpression, LikelihoodEvaluator};
use criterion::{criterion_group, criterion_main, Criterion};
use ndarray::Array1;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;

fn criterion_likelihood(c: &mut Criterion) {
    let nts = [50, 100, 200];

    let mut group = c.benchmark_group("likelihood");
    group.sample_size(20);
    for nt in nts {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let x = Array1::linspace(0., 10., nt);
        let noise = Array1::random_using(nt, Normal::new(0., 0.1).unwrap(), &mut rng);
        let y = x.mapv(|v| (2. * std::f64::consts::PI * v).sin() + 0.1 * v) + noise;

        let kernel = KernelExpression::base(BaseKernelKind::Periodic)
            * KernelExpression::base(BaseKernelKind::SquaredExponential)
            + KernelExpression::base(BaseKernelKind::Linear)
            + KernelExpression::base(BaseKernelKind::WhiteNoise);
        let evaluator = CholeskyLikelihood::default();

        group.bench_function(format!("lml {nt}"), |b| {
            b.iter(|| {
                std::hint::black_box(
                    evaluator
                        .log_marginal_likelihood(&kernel, &x.view(), &y.view())
                        .expect("likelihood evaluated"),
                );
            });
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_likelihood);
criterion_main!(benches);
