use autokernel_search::{search_xy, SearchConfig};
use ndarray::{array, Array1};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Normal;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;

fn main() -> anyhow::Result<()> {
    // noisy sine of period 1 observed over 10 periods
    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let x = Array1::linspace(0., 10., 100);
    let noise = Array1::random_using(100, Normal::new(0., 0.1).unwrap(), &mut rng);
    let y = x.mapv(|v| (2. * std::f64::consts::PI * v).sin()) + noise;

    let res = search_xy(
        &x,
        &y,
        SearchConfig::default()
            .beam_width(3)
            .max_generations(2)
            .restarts_per_fit(3)
            .seed(42),
    )?;

    println!("Search {:?} after {} generations ({} fits)", res.status, res.generations, res.n_fits);
    for (i, c) in res.ranking().iter().take(5).enumerate() {
        println!("#{} {}", i + 1, c);
    }

    if let Some(gp) = res.model() {
        let xtest = array![[10.25], [10.5]];
        let mean = gp.predict(&xtest)?;
        println!("Forecast at {} = {}", xtest.column(0), mean);
    }
    Ok(())
}
