use autokernel_search::{search_xy, GrammarSpec, ScoreKind, SearchConfig};
use ndarray::Array1;
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;

/// Monthly series with a linear trend and a yearly seasonality growing with the trend
fn airline_like(n: usize, rng: &mut Xoshiro256Plus) -> (Array1<f64>, Array1<f64>) {
    let x = Array1::linspace(1949., 1949. + (n as f64 - 1.) / 12., n);
    let noise = Array1::random_using(n, Normal::new(0., 0.05).unwrap(), rng);
    let y = x.mapv(|t| {
        let trend = 0.3 * (t - 1949.);
        trend + (1. + 0.2 * trend) * (2. * std::f64::consts::PI * t).sin()
    }) + noise;
    (x, y)
}

fn main() -> anyhow::Result<()> {
    let mut rng = Xoshiro256Plus::seed_from_u64(1949);
    let (x, y) = airline_like(96, &mut rng);

    let res = search_xy(
        &x,
        &y,
        SearchConfig::default()
            .beam_width(4)
            .max_generations(3)
            .moves(GrammarSpec::ALL)
            .score(ScoreKind::Bic)
            .max_time(600.)
            .seed(1949),
    )?;

    println!("Best kernel: {}", res.incumbent);
    println!("Score trace: {:?}", res.incumbent_trace);
    println!(
        "{} generations, {} fits, {} pruned, status {:?}",
        res.generations, res.n_fits, res.n_pruned, res.status
    );
    Ok(())
}
