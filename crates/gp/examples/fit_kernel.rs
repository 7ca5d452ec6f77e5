use autokernel_gp::{BaseKernelKind, KernelExpression, KernelGp};
use linfa::prelude::*;
use ndarray::{array, Array1, Axis};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    // linear trend plus a yearly-like oscillation
    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let x = Array1::linspace(0., 6., 60);
    let noise = Array1::random_using(60, Normal::new(0., 0.2).unwrap(), &mut rng);
    let y = x.mapv(|v| 0.5 * v + (2. * std::f64::consts::PI * v).sin()) + noise;
    let dataset = Dataset::new(x.insert_axis(Axis(1)), y);

    let kernel = KernelExpression::base(BaseKernelKind::Linear)
        + KernelExpression::base(BaseKernelKind::Periodic)
        + KernelExpression::base(BaseKernelKind::WhiteNoise);
    let gp = KernelGp::params(kernel).n_start(10).fit(&dataset)?;

    println!("Fitted kernel: {:#}", gp.kernel());
    println!("log likelihood = {:.3}, BIC = {:.3}", gp.log_likelihood(), gp.bic());

    let xtest = array![[6.25], [6.5], [7.]];
    let mean = gp.predict(&xtest)?;
    let std = gp.predict_var(&xtest)?.mapv(f64::sqrt);
    for ((x, m), s) in xtest.column(0).iter().zip(mean).zip(std) {
        println!("f({x}) = {m:.3} +/- {:.3}", 2. * s);
    }
    Ok(())
}
