use crate::errors::{GpError, Result};
use crate::expression::KernelExpression;
use crate::likelihood::{LikelihoodEvaluator, HALF_LN_2PI};
use crate::optimization::{prepare_multistart, ConvergenceStatus, MaximizerOutcome};
use crate::parameters::{KernelGpParams, KernelGpValidParams};
use crate::utils::single_column;

use linfa::prelude::{DatasetBase, Fit};
use linfa_linalg::{cholesky::*, triangular::*};
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix1, Ix2};
use ndarray_stats::QuantileExt;

use log::{debug, error};
use rayon::prelude::*;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;
use web_time::Instant;

/// Default number of optimizer runs when fitting hyperparameters
pub const GP_OPTIM_N_START: usize = 5;
/// Minimum number of iterations of one optimizer run
pub const GP_MIN_EVAL: usize = 10;
/// Default maximum number of iterations of one optimizer run
pub const GP_MAX_EVAL: usize = 200;
/// Default seed of the restart sampling
pub const GP_DEFAULT_SEED: u64 = 42;

/// Relative jitter added to a predictive covariance before its factorization
const PREDICTIVE_JITTER: f64 = 1e-10;

/// A zero-mean Gaussian process whose covariance is a [`KernelExpression`] with
/// hyperparameters fitted by maximizing the log marginal likelihood.
///
/// The fit runs `n_start` bounded optimizations: the first one starts from the
/// current hyperparameter values of the expression (warm start), the others from a
/// latin hypercube sample of the hyperparameter bounds in optimization coordinates.
/// Runs failing on numerical grounds are discarded, the best remaining one is kept.
///
/// Outputs are not normalized: the kernel amplitude accounts for the scale of the data.
///
/// # Example
///
/// ```no_run
/// use autokernel_gp::{BaseKernelKind, KernelExpression, KernelGp};
/// use linfa::prelude::*;
/// use ndarray::{Array1, Axis};
///
/// let x = Array1::linspace(0., 4., 40);
/// let y = x.mapv(|v: f64| (6.28 * v).sin());
/// let kernel = KernelExpression::base(BaseKernelKind::Periodic)
///     + KernelExpression::base(BaseKernelKind::WhiteNoise);
/// let gp = KernelGp::params(kernel)
///     .n_start(3)
///     .fit(&Dataset::new(x.insert_axis(Axis(1)), y))
///     .expect("GP fitted");
/// println!("{:#} lml={}", gp.kernel(), gp.log_likelihood());
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct KernelGp {
    /// Kernel expression with optimized hyperparameters
    kernel: KernelExpression,
    /// Log marginal likelihood at the optimum
    likelihood: f64,
    /// Convergence status of the retained optimizer run
    status: ConvergenceStatus,
    /// Number of discarded optimizer runs
    n_failed_starts: usize,
    /// Lower Cholesky factor of the training covariance
    chol: Array2<f64>,
    /// K^-1 y
    alpha: Array1<f64>,
    /// Training data
    training_data: (Array1<f64>, Array1<f64>),
    /// Parameters used to fit this model
    params: KernelGpValidParams,
}

impl fmt::Display for KernelGp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GP({:#}, lml={:.4}, status={:?})",
            self.kernel, self.likelihood, self.status
        )
    }
}

impl KernelGp {
    /// Gp parameters fitting the given kernel expression
    pub fn params(kernel: KernelExpression) -> KernelGpParams {
        KernelGpParams::new(kernel)
    }

    /// Kernel expression with fitted hyperparameters
    pub fn kernel(&self) -> &KernelExpression {
        &self.kernel
    }

    /// Log marginal likelihood of the training data
    pub fn log_likelihood(&self) -> f64 {
        self.likelihood
    }

    /// Convergence status of the retained optimizer run
    pub fn status(&self) -> ConvergenceStatus {
        self.status
    }

    /// Number of optimizer runs discarded because of numerical failures
    pub fn n_failed_starts(&self) -> usize {
        self.n_failed_starts
    }

    /// Training inputs and outputs
    pub fn training_data(&self) -> (&Array1<f64>, &Array1<f64>) {
        (&self.training_data.0, &self.training_data.1)
    }

    /// Parameters used to fit this model
    pub fn fit_params(&self) -> &KernelGpValidParams {
        &self.params
    }

    /// Bayesian information criterion `lml - 0.5 * k * ln(n)` where `k` is the
    /// number of free hyperparameters and `n` the number of training points.
    /// Higher is better.
    pub fn bic(&self) -> f64 {
        let n = self.training_data.0.len() as f64;
        self.likelihood - 0.5 * self.kernel.n_params() as f64 * n.ln()
    }

    /// Predict posterior mean at `n` points given as a (n, 1) matrix
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array1<f64>> {
        let xs = single_column(x)?;
        self.latent_mean(&xs)
    }

    /// Predict variance at `n` points given as a (n, 1) matrix.
    ///
    /// The variance is the one of a new noisy observation: white noise terms are included.
    pub fn predict_var(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array1<f64>> {
        let xs = single_column(x)?;
        let prior = self.kernel.gram(&xs)?;
        let v = self.whitened_cross_cov(&xs)?;
        let var = prior.diag().to_owned() - v.mapv(|a| a * a).sum_axis(Axis(0));
        Ok(var.mapv(|s| s.max(0.)))
    }

    /// Predict the joint covariance matrix at `n` points given as a (n, 1) matrix
    pub fn predict_cov(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Result<Array2<f64>> {
        let xs = single_column(x)?;
        self.predictive_cov(&xs)
    }

    /// Training outputs minus the posterior mean at training inputs
    pub fn residuals(&self) -> Result<Array1<f64>> {
        let (x, y) = &self.training_data;
        Ok(y - &self.latent_mean(&x.view())?)
    }

    /// Log density of held-out `y` at inputs `x` under the joint predictive distribution
    pub fn log_likelihood_test(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        y: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<f64> {
        let xs = single_column(x)?;
        check_targets(&xs, y)?;
        let mean = self.latent_mean(&xs)?;
        let mut cov = self.predictive_cov(&xs)?;
        let max_diag = *cov.diag().max().map_err(|_| {
            GpError::LikelihoodComputationError("undefined predictive variance".to_string())
        })?;
        let jitter = PREDICTIVE_JITTER * max_diag.max(1.);
        cov.diag_mut().mapv_inplace(|v| v + jitter);
        let chol = cov.cholesky().map_err(|e| {
            GpError::LikelihoodComputationError(format!("predictive covariance: {e}"))
        })?;
        let r = (y - &mean).insert_axis(Axis(1));
        let z = chol.solve_triangular(&r, UPLO::Lower)?;
        let log_det = chol.diag().mapv(|v| v.ln()).sum();
        Ok(-0.5 * z.mapv(|v| v * v).sum() - log_det - xs.len() as f64 * HALF_LN_2PI)
    }

    /// Sum of the log densities of held-out `y` at inputs `x` under the predictive
    /// marginals: `-0.5 N ln(2 pi) - sum(0.5 z^2 + ln(sigma))` with `z = (y - mean) / sigma`
    pub fn prediction_log_prob_score(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix2>,
        y: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<f64> {
        check_targets(&single_column(x)?, y)?;
        let mean = self.predict(x)?;
        let sigma = self.predict_var(x)?.mapv(f64::sqrt);
        if sigma.iter().any(|s| *s <= 0.) {
            return Err(GpError::LikelihoodComputationError(
                "null predictive variance".to_string(),
            ));
        }
        let score = ndarray::Zip::from(y)
            .and(&mean)
            .and(&sigma)
            .fold(0., |acc, &yi, &mu, &s| {
                let z = (yi - mu) / s;
                acc - 0.5 * z * z - s.ln()
            });
        Ok(score - y.len() as f64 * HALF_LN_2PI)
    }

    fn latent_mean(&self, xs: &ArrayView1<f64>) -> Result<Array1<f64>> {
        let kstar = self.kernel.value(xs, &self.training_data.0)?;
        Ok(kstar.dot(&self.alpha))
    }

    /// `L^-1 k(X, xs)`
    fn whitened_cross_cov(&self, xs: &ArrayView1<f64>) -> Result<Array2<f64>> {
        let kstar = self.kernel.value(&self.training_data.0, xs)?;
        Ok(self.chol.solve_triangular(&kstar, UPLO::Lower)?)
    }

    fn predictive_cov(&self, xs: &ArrayView1<f64>) -> Result<Array2<f64>> {
        let prior = self.kernel.gram(xs)?;
        let v = self.whitened_cross_cov(xs)?;
        Ok(prior - v.t().dot(&v))
    }
}

fn check_targets(x: &ArrayView1<f64>, y: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> Result<()> {
    if x.len() != y.len() {
        return Err(GpError::InvalidValueError(format!(
            "Inputs ({}) and outputs ({}) should have the same length",
            x.len(),
            y.len()
        )));
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(GpError::InvalidValueError(
            "Outputs should be finite".to_string(),
        ));
    }
    Ok(())
}

impl<D: Data<Elem = f64>> Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, GpError>
    for KernelGpValidParams
{
    type Object = KernelGp;

    /// Fit kernel hyperparameters using maximum likelihood
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self::Object> {
        let x = single_column(dataset.records())?;
        let y = dataset.targets().view();
        if x.is_empty() {
            return Err(GpError::InvalidValueError(
                "Training data should not be empty".to_string(),
            ));
        }
        check_targets(&x, &y)?;
        if let Err(err) = self.kernel().check_domain() {
            error!("Invalid hyperparameters in {:#}: {err}", self.kernel());
            return Err(err);
        }

        let now = Instant::now();
        let deadline = self.time_budget().map(|budget| now + budget);
        let objective = |t: &[f64]| -> Result<(f64, Array1<f64>)> {
            let mut kernel = self.kernel().clone();
            kernel.set_transformed_params(t)?;
            self.likelihood().log_marginal_likelihood(&kernel, &x, &y)
        };

        let bounds = self.kernel().transformed_bounds();
        let (best, n_failed_starts) = if bounds.is_empty() {
            // nothing to optimize
            let (value, _) = objective(&[])?;
            let outcome = MaximizerOutcome {
                x: Array1::zeros(0),
                value,
                status: ConvergenceStatus::Converged,
                n_iters: 0,
            };
            (outcome, 0)
        } else {
            let starts = prepare_multistart(
                self.n_start(),
                &self.kernel().transformed_params(),
                &bounds,
                self.seed(),
            );
            debug!(
                "Optimize {} with multistart {:?} and bounds {:?}",
                self.kernel(),
                starts,
                bounds
            );
            let maximizer = self.maximizer().build(self.max_eval());
            let outcomes = (0..starts.nrows())
                .into_par_iter()
                .map(|i| maximizer.maximize(&objective, &starts.row(i).to_vec(), &bounds, deadline))
                .collect::<Vec<_>>();
            let n_starts = outcomes.len();
            let survivors = outcomes
                .into_iter()
                .filter(|o| o.status != ConvergenceStatus::NumericalFailure && o.value.is_finite())
                .collect::<Vec<_>>();
            let n_failed = n_starts - survivors.len();
            // first maximum wins ties
            let best = survivors.into_iter().fold(None, |best: Option<MaximizerOutcome>, o| {
                match best {
                    Some(b) if b.value >= o.value => Some(b),
                    _ => Some(o),
                }
            });
            match best {
                Some(best) => (best, n_failed),
                None => {
                    return Err(GpError::FitError(format!(
                        "all {n_starts} optimizer runs failed for {}",
                        self.kernel()
                    )))
                }
            }
        };
        debug!(
            "elapsed optim {} = {:?}ms",
            self.kernel(),
            now.elapsed().as_millis()
        );

        let mut kernel = self.kernel().clone();
        kernel.set_transformed_params(&best.x.to_vec())?;
        let k = kernel.gram(&x)?;
        let fact = self.likelihood().factorize(&kernel, k, &y)?;

        Ok(KernelGp {
            kernel,
            likelihood: fact.lml,
            status: best.status,
            n_failed_starts,
            chol: fact.chol,
            alpha: fact.alpha,
            training_data: (x.to_owned(), y.to_owned()),
            params: self.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::{BaseKernelKind, HyperparameterKind};
    use crate::likelihood::CholeskyLikelihood;
    use approx::assert_abs_diff_eq;
    use linfa::prelude::Dataset;
    use ndarray::{array, Array1};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;
    use rand_xoshiro::Xoshiro256Plus;
    use std::time::Duration;

    fn noisy_sine(n: usize, span: f64) -> Dataset<f64, f64, ndarray::Ix1> {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let x = Array1::linspace(0., span, n);
        let noise = Array1::random_using(n, Normal::new(0., 0.1).unwrap(), &mut rng);
        let y = x.mapv(|v| (2. * std::f64::consts::PI * v).sin()) + noise;
        Dataset::new(x.insert_axis(Axis(1)), y)
    }

    fn periodic_plus_noise(period: f64) -> KernelExpression {
        let mut per = KernelExpression::base(BaseKernelKind::Periodic);
        per.set_params(&[1., 1., period]).unwrap();
        let mut wn = KernelExpression::base(BaseKernelKind::WhiteNoise);
        wn.set_params(&[0.1]).unwrap();
        per + wn
    }

    fn fitted_period(gp: &KernelGp) -> f64 {
        gp.kernel()
            .base_kernels()
            .into_iter()
            .find_map(|b| b.param(HyperparameterKind::Period))
            .unwrap()
    }

    #[test]
    fn test_fit_periodic() {
        let data = noisy_sine(40, 4.);
        let gp = KernelGp::params(periodic_plus_noise(1.05))
            .n_start(3)
            .fit(&data)
            .expect("GP fitted");
        println!("{gp}");
        assert_abs_diff_eq!(fitted_period(&gp), 1., epsilon = 2e-2);
        assert_ne!(gp.status(), ConvergenceStatus::NumericalFailure);
        assert!(gp.log_likelihood().is_finite());
    }

    #[test]
    fn test_refit_is_deterministic() {
        let data = noisy_sine(30, 3.);
        let params = KernelGp::params(periodic_plus_noise(1.1)).n_start(4).seed(7);
        let gp1 = params.clone().fit(&data).unwrap();
        let gp2 = params.fit(&data).unwrap();
        assert_eq!(gp1.kernel().params(), gp2.kernel().params());
        assert_eq!(gp1.log_likelihood(), gp2.log_likelihood());
    }

    #[test]
    fn test_fit_improves_warm_start() {
        let data = noisy_sine(30, 3.);
        let kernel = KernelExpression::base(BaseKernelKind::SquaredExponential)
            + KernelExpression::base(BaseKernelKind::WhiteNoise);
        let (lml0, _) = CholeskyLikelihood::default()
            .log_marginal_likelihood(
                &kernel,
                &data.records().column(0),
                &data.targets().view(),
            )
            .unwrap();
        let gp = KernelGp::params(kernel).n_start(1).fit(&data).unwrap();
        assert!(gp.log_likelihood() >= lml0);
    }

    #[test]
    fn test_all_starts_fail() {
        // constant data with a rank one covariance
        let x = Array1::linspace(0., 1., 10).insert_axis(Axis(1));
        let data = Dataset::new(x, Array1::from_elem(10, 3.));
        let res = KernelGp::params(KernelExpression::base(BaseKernelKind::Constant))
            .n_start(2)
            .likelihood(CholeskyLikelihood::default().jitter(0.))
            .fit(&data);
        assert!(matches!(res, Err(GpError::FitError(_))));
    }

    #[test]
    fn test_fit_noise_free_kernel_on_dense_data() {
        let data = noisy_sine(200, 4.);
        for kind in [
            BaseKernelKind::SquaredExponential,
            BaseKernelKind::Periodic,
            BaseKernelKind::Constant,
        ] {
            let gp = KernelGp::params(KernelExpression::base(kind))
                .n_start(2)
                .fit(&data)
                .unwrap_or_else(|e| panic!("{kind} not fitted: {e}"));
            assert!(gp.log_likelihood().is_finite());
        }
    }

    #[test]
    fn test_expired_time_budget() {
        let data = noisy_sine(30, 3.);
        let gp = KernelGp::params(periodic_plus_noise(1.1))
            .n_start(2)
            .time_budget(Some(Duration::from_nanos(1)))
            .fit(&data)
            .unwrap();
        assert_eq!(gp.status(), ConvergenceStatus::MaxIterExceeded);
    }

    #[test]
    fn test_invalid_inputs() {
        let params = KernelGp::params(KernelExpression::base(BaseKernelKind::Linear));
        let data = Dataset::new(array![[1., 2.], [3., 4.]], array![1., 2.]);
        assert!(matches!(
            params.clone().fit(&data),
            Err(GpError::InvalidValueError(_))
        ));
        let data = Dataset::new(array![[1.], [3.]], array![1., f64::NAN]);
        assert!(matches!(
            params.fit(&data),
            Err(GpError::InvalidValueError(_))
        ));
    }

    #[test]
    fn test_predictions() {
        let data = noisy_sine(30, 3.);
        let gp = KernelGp::params(periodic_plus_noise(1.))
            .n_start(2)
            .fit(&data)
            .unwrap();

        let residuals = gp.residuals().unwrap();
        assert!(residuals.std(0.) < 0.3);
        assert!(residuals.iter().any(|r| r.abs() > 0.));

        let xtest = array![[0.25], [1.25], [2.5]];
        let mean = gp.predict(&xtest).unwrap();
        assert_abs_diff_eq!(mean, array![1., 1., 0.], epsilon = 0.2);

        let var = gp.predict_var(&xtest).unwrap();
        let cov = gp.predict_cov(&xtest).unwrap();
        assert!(var.iter().all(|v| *v > 0.));
        assert_abs_diff_eq!(cov.diag(), var, epsilon = 1e-10);
    }

    #[test]
    fn test_held_out_scores() {
        let data = noisy_sine(30, 3.);
        let gp = KernelGp::params(periodic_plus_noise(1.))
            .n_start(2)
            .fit(&data)
            .unwrap();
        // a single point has the same joint and marginal densities
        let (xt, yt) = (array![[0.6]], array![-0.5]);
        let joint = gp.log_likelihood_test(&xt, &yt).unwrap();
        let marginal = gp.prediction_log_prob_score(&xt, &yt).unwrap();
        assert_abs_diff_eq!(joint, marginal, epsilon = 1e-6);

        let xt = array![[0.1], [0.7], [1.9]];
        let good = xt.column(0).mapv(|v| (2. * std::f64::consts::PI * v).sin());
        let bad = good.mapv(|v| v + 2.);
        assert!(gp.log_likelihood_test(&xt, &good).unwrap() > gp.log_likelihood_test(&xt, &bad).unwrap());
        assert!(gp.prediction_log_prob_score(&xt, &good).unwrap() > gp.prediction_log_prob_score(&xt, &bad).unwrap());
    }

    #[test]
    fn test_bic() {
        let data = noisy_sine(20, 2.);
        let gp = KernelGp::params(periodic_plus_noise(1.))
            .n_start(1)
            .fit(&data)
            .unwrap();
        assert_abs_diff_eq!(gp.bic(), gp.log_likelihood() - 2. * 20f64.ln());
    }
}
