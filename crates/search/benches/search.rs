use autokernel_search::{search_xy, KernelSpec, SearchConfig, AUTOKERNEL_LOG};
use criterion::{criterion_group, criterion_main, Criterion};
use env_logger::{Builder, Env};
use ndarray::Array1;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;

fn criterion_search(c: &mut Criterion) {
    let env = Env::new().filter_or(AUTOKERNEL_LOG, "error");
    let mut builder = Builder::from_env(env);
    let builder = builder.target(env_logger::Target::Stdout);
    builder.try_init().ok();

    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let x = Array1::linspace(0., 5., 40);
    let noise = Array1::random_using(40, Normal::new(0., 0.1).unwrap(), &mut rng);
    let y = x.mapv(|v| (2. * std::f64::consts::PI * v).sin()) + noise;

    let mut group = c.benchmark_group("search");
    group.sample_size(10);
    for n_workers in [1, 4] {
        group.bench_function(format!("sine search {n_workers} workers"), |b| {
            b.iter(|| {
                std::hint::black_box(
                    search_xy(
                        &x,
                        &y,
                        SearchConfig::default()
                            .catalog(
                                KernelSpec::SQUAREDEXPONENTIAL
                                    | KernelSpec::PERIODIC
                                    | KernelSpec::LINEAR
                                    | KernelSpec::WHITENOISE,
                            )
                            .beam_width(2)
                            .max_generations(1)
                            .restarts_per_fit(1)
                            .max_eval(40)
                            .n_workers(n_workers)
                            .seed(42),
                    )
                    .expect("Kernel search"),
                )
            });
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_search);
criterion_main!(benches);
