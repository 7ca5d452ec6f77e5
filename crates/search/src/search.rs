//! Kernel search entry points wrapping the argmin `Executor` running a
//! [`KernelSearchSolver`] on a [`KernelFitProblem`].
//!
//! ```no_run
//! use autokernel_search::{search_xy, SearchConfig};
//! use ndarray::Array1;
//!
//! let x = Array1::linspace(0., 10., 100);
//! let y = x.mapv(|v| (2. * std::f64::consts::PI * v).sin() + 0.1 * v);
//! let res = search_xy(&x, &y, SearchConfig::default().max_generations(3))
//!     .expect("kernel search");
//! println!("Best kernel {} ({:?})", res.incumbent, res.status);
//! ```
use crate::errors::{Result, SearchError};
use crate::solver::{
    KernelFitProblem, KernelSearchSolver, SearchConfig, SearchState, ValidSearchConfig,
};
use crate::types::{SearchResult, SearchStatus};

use argmin::core::{Executor, State, TerminationReason};
use linfa::prelude::{Dataset, DatasetBase};
use linfa::ParamGuard;
use log::info;
use ndarray::{ArrayBase, Axis, Data, Ix1, Ix2};

/// Kernel structure search over a dataset with one input column
#[derive(Clone, Debug)]
pub struct KernelSearch {
    solver: KernelSearchSolver,
}

impl KernelSearch {
    /// Search with the given validated configuration
    pub fn new(config: ValidSearchConfig) -> Self {
        KernelSearch {
            solver: KernelSearchSolver::new(config),
        }
    }

    /// Search configuration
    pub fn config(&self) -> &ValidSearchConfig {
        self.solver.config()
    }

    /// Runs the search on `dataset`.
    ///
    /// Fails with [`SearchError::InvalidInputError`] when the dataset is empty, has more than
    /// one input column, targets of a different length or non-finite values.
    pub fn run<D: Data<Elem = f64>>(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<SearchResult> {
        let problem = KernelFitProblem::new(dataset)?;
        info!("{:?}", self.solver.config);
        let max_iters = self.solver.config.max_generations as u64;
        let result = Executor::new(problem, self.solver.clone())
            .configure(|state| state.max_iters(max_iters))
            .run()?;
        info!("{}", result);
        into_search_result(result.state)
    }
}

fn into_search_result(state: SearchState) -> Result<SearchResult> {
    let status = match state.get_termination_reason() {
        Some(TerminationReason::SolverConverged) => SearchStatus::Converged,
        _ => SearchStatus::BudgetExhausted,
    };
    let generations = state.get_iter();
    let incumbent = state.incumbent.ok_or_else(|| {
        SearchError::InvalidInputError("Search ended without any candidate".to_string())
    })?;
    info!("Search {:?}: best {}", status, incumbent);
    Ok(SearchResult {
        incumbent,
        history: state.history,
        status,
        generations,
        n_fits: state.n_fits,
        n_pruned: state.n_pruned,
        incumbent_trace: state.incumbent_trace,
    })
}

/// Searches the kernel expression best explaining `data` (one input column).
///
/// Fails with [`SearchError::InvalidConfigError`] when `config` is invalid and with
/// [`SearchError::InvalidInputError`] when `data` is malformed.
pub fn search<D: Data<Elem = f64>>(
    data: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    config: SearchConfig,
) -> Result<SearchResult> {
    KernelSearch::new(config.check()?).run(data)
}

/// Searches the kernel expression best explaining observations `y` at inputs `x`
pub fn search_xy(
    x: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    y: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    config: SearchConfig,
) -> Result<SearchResult> {
    if x.len() != y.len() {
        return Err(SearchError::InvalidInputError(format!(
            "Expected {} outputs, got {}",
            x.len(),
            y.len()
        )));
    }
    let dataset = Dataset::new(x.to_owned().insert_axis(Axis(1)), y.to_owned());
    search(&dataset, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::ConstraintSet;
    use approx::assert_abs_diff_eq;
    use autokernel_gp::kernels::BaseKernel;
    use autokernel_gp::{
        BaseKernelKind, ConvergenceStatus, HyperparameterKind, KernelExpression, KernelSpec,
        MaximizerKind,
    };
    use ndarray::{Array1, Axis};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;
    use rand_xoshiro::Xoshiro256Plus;
    use serial_test::serial;

    fn noisy_sine(n: usize) -> (Array1<f64>, Array1<f64>) {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let x = Array1::linspace(0., 10., n);
        let noise = Array1::random_using(n, Normal::new(0., 0.1).unwrap(), &mut rng);
        let y = x.mapv(|v| (2. * std::f64::consts::PI * v).sin()) + noise;
        (x, y)
    }

    fn noisy_line(n: usize) -> (Array1<f64>, Array1<f64>) {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let x = Array1::linspace(0., 4., n);
        let noise = Array1::random_using(n, Normal::new(0., 0.2).unwrap(), &mut rng);
        let y = x.mapv(|v| 0.8 * v - 1.) + noise;
        (x, y)
    }

    fn periods(expr: &KernelExpression) -> Vec<f64> {
        expr.base_kernels()
            .iter()
            .filter_map(|b| b.param(HyperparameterKind::Period))
            .collect()
    }

    /// Whether white noise is a factor of a product somewhere in `expr`
    fn has_noise_product(expr: &KernelExpression) -> bool {
        let is_noise = |e: &KernelExpression| {
            matches!(e, KernelExpression::Base(b) if b.kind() == BaseKernelKind::WhiteNoise)
        };
        match expr {
            KernelExpression::Product(factors) => {
                factors.iter().any(is_noise) || factors.iter().any(has_noise_product)
            }
            e => e.children().into_iter().any(has_noise_product),
        }
    }

    #[test]
    #[serial]
    fn test_sine_search() {
        let (x, y) = noisy_sine(100);
        let config = SearchConfig::default()
            .beam_width(3)
            .max_generations(2)
            .restarts_per_fit(2);
        let res = search_xy(&x, &y, config).expect("sine search");
        println!("Sine search: {} ({:?})", res.incumbent, res.status);

        let best = &res.incumbent;
        assert!(best.expression.contains(BaseKernelKind::Periodic));
        assert!(best.expression.has_noise_summand(), "{}", best.expression);
        for period in periods(&best.expression) {
            assert_abs_diff_eq!(period, 1., epsilon = 5e-2);
        }
        // every base kernel of the default catalog is fitted on dense data
        assert_eq!(
            res.history.iter().filter(|c| c.generation == 0).count(),
            KernelSpec::DEFAULT.kinds().len()
        );
        let se = res
            .history
            .iter()
            .find(|c| c.expression.canonical_form() == "SE")
            .expect("squared exponential fitted");
        assert!(se.score.is_finite());
        assert!(best.score > se.score);
        assert!(res.generations >= 1);
        assert!(res.history.iter().any(|c| c.generation > 0));
        for c in res.history.iter() {
            assert!(!has_noise_product(&c.expression), "{}", c.expression);
        }
        assert!(res.model().is_some());

        // periods stay within their data driven bounds
        let (lo, up) = ConstraintSet::from_data(&x.view(), &y.view())
            .stats()
            .period_bounds();
        for c in res.history.iter() {
            for period in periods(&c.expression) {
                assert!(period >= lo - 1e-9 && period <= up + 1e-9);
            }
        }
    }

    #[test]
    #[serial]
    fn test_repeated_inputs_search() {
        // every input value observed twice
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let x = Array1::linspace(0., 6., 20);
        let x = ndarray::concatenate![Axis(0), x, x];
        let noise = Array1::random_using(40, Normal::new(0., 0.1).unwrap(), &mut rng);
        let y = x.mapv(f64::sin) + noise;
        let config = SearchConfig::default()
            .beam_width(2)
            .max_generations(1)
            .restarts_per_fit(2);
        let res = search_xy(&x, &y, config).expect("search on repeated inputs");
        println!("Repeated inputs search: {} ({:?})", res.incumbent, res.status);

        assert_eq!(
            res.history.iter().filter(|c| c.generation == 0).count(),
            KernelSpec::DEFAULT.kinds().len()
        );
        assert_ne!(res.incumbent.status, ConvergenceStatus::NumericalFailure);
        assert!(res.incumbent.score.is_finite());
        assert!(res.model().is_some());
        let wn = res
            .history
            .iter()
            .find(|c| c.expression.canonical_form() == "WN")
            .expect("white noise fitted");
        assert!(res.incumbent.score > wn.score);
    }

    #[test]
    #[serial]
    fn test_fit_deadline_keeps_candidates() {
        let (x, y) = noisy_line(20);
        let config = SearchConfig::default()
            .maximizer(MaximizerKind::Cobyla)
            .per_fit_time_budget(1e-6)
            .beam_width(1)
            .max_generations(0);
        let res = search_xy(&x, &y, config).unwrap();
        assert_eq!(res.n_pruned, 0);
        assert_eq!(res.history.len(), KernelSpec::DEFAULT.kinds().len());
        assert!(res
            .history
            .iter()
            .all(|c| c.status == ConvergenceStatus::MaxIterExceeded && c.score.is_finite()));
        assert!(res.model().is_some());
    }

    #[test]
    #[serial]
    fn test_zero_variance_search() {
        let x = Array1::linspace(0., 1., 20);
        let y = Array1::from_elem(20, 3.);
        let config = SearchConfig::default()
            .beam_width(3)
            .max_generations(3)
            .restarts_per_fit(2);
        let res = search_xy(&x, &y, config).expect("no fatal error on constant data");
        println!("Constant search: {} ({:?})", res.incumbent, res.status);

        let c = ConstraintSet::from_data(&x.view(), &y.view());
        let expected = KernelExpression::from(BaseKernel::from_priors(BaseKernelKind::Constant, &c))
            + BaseKernel::from_priors(BaseKernelKind::WhiteNoise, &c).into();
        assert_eq!(res.incumbent.hash, expected.canonical_hash());
        let noise = res
            .incumbent
            .expression
            .base_kernels()
            .iter()
            .find(|b| b.kind() == BaseKernelKind::WhiteNoise)
            .and_then(|b| b.param(HyperparameterKind::Variance))
            .unwrap();
        let floor = c
            .bounds_for(BaseKernelKind::WhiteNoise, HyperparameterKind::Variance)
            .lower;
        assert!(noise < 100. * floor, "noise variance {noise} far from its floor {floor}");
    }

    #[test]
    #[serial]
    fn test_no_generation_returns_best_base_kernel() {
        let (x, y) = noisy_line(25);
        let config = SearchConfig::default().beam_width(1).max_generations(0);
        let res = search_xy(&x, &y, config).unwrap();
        assert_eq!(res.generations, 0);
        assert_eq!(res.status, SearchStatus::BudgetExhausted);
        assert!(res.history.iter().all(|c| c.generation == 0 && c.parent.is_none()));
        assert_eq!(res.history.len() + res.n_pruned, KernelSpec::DEFAULT.kinds().len());
        assert_eq!(res.ranking()[0].hash, res.incumbent.hash);
        assert_eq!(res.incumbent_trace, vec![res.incumbent.score]);
    }

    #[test]
    #[serial]
    fn test_incumbent_never_degrades() {
        let (x, y) = noisy_line(25);
        let config = SearchConfig::default()
            .beam_width(2)
            .max_generations(2)
            .restarts_per_fit(2)
            .score_tolerance(0.);
        let res = search_xy(&x, &y, config).unwrap();
        assert!(!res.incumbent_trace.is_empty());
        assert!(res.incumbent_trace.windows(2).all(|w| w[1] >= w[0]));
        assert_abs_diff_eq!(
            *res.incumbent_trace.last().unwrap(),
            res.incumbent.score
        );
        assert!(res.generations <= 2);
        // discovery indices are unique and each hash is fitted once
        let mut hashes: Vec<_> = res.history.iter().map(|c| c.hash).collect();
        hashes.sort();
        hashes.dedup();
        assert_eq!(hashes.len(), res.history.len());
        assert_eq!(res.n_fits, res.history.len() + res.n_pruned);
        for c in res.history.iter().filter(|c| c.generation > 0) {
            assert!(c.parent.is_some());
        }
    }

    #[test]
    #[serial]
    fn test_search_independent_of_workers() {
        let (x, y) = noisy_line(20);
        let config = SearchConfig::default()
            .beam_width(2)
            .max_generations(1)
            .restarts_per_fit(2)
            .seed(7);
        let res1 = search_xy(&x, &y, config.clone().n_workers(1)).unwrap();
        let res2 = search_xy(&x, &y, config.n_workers(3)).unwrap();
        assert_eq!(res1.incumbent.hash, res2.incumbent.hash);
        assert_eq!(res1.incumbent.params, res2.incumbent.params);
        let scores1: Vec<f64> = res1.history.iter().map(|c| c.score).collect();
        let scores2: Vec<f64> = res2.history.iter().map(|c| c.score).collect();
        assert_eq!(scores1, scores2);
    }

    #[test]
    fn test_all_base_kernel_fits_fail() {
        // without nugget a constant kernel alone has a singular covariance
        let (x, y) = noisy_line(15);
        let config = SearchConfig::default()
            .catalog(KernelSpec::CONSTANT)
            .jitter(0.);
        let res = search_xy(&x, &y, config).unwrap();
        assert_eq!(res.status, SearchStatus::Converged);
        assert_eq!(res.incumbent.expression.canonical_form(), "CONST");
        assert_eq!(res.incumbent.status, ConvergenceStatus::NumericalFailure);
        assert!(res.model().is_none());
        assert_eq!(res.n_pruned, 1);
        assert_eq!(res.generations, 0);
    }

    #[test]
    fn test_constant_kernel_fits_with_nugget() {
        let (x, y) = noisy_line(15);
        let config = SearchConfig::default()
            .catalog(KernelSpec::CONSTANT)
            .max_generations(0);
        let res = search_xy(&x, &y, config).unwrap();
        assert_eq!(res.status, SearchStatus::BudgetExhausted);
        assert_eq!(res.n_pruned, 0);
        assert_ne!(res.incumbent.status, ConvergenceStatus::NumericalFailure);
        assert!(res.model().is_some());
    }

    #[test]
    fn test_invalid_inputs() {
        let x = Array1::linspace(0., 1., 5);
        let y = Array1::zeros(4);
        assert!(matches!(
            search_xy(&x, &y, SearchConfig::default()),
            Err(SearchError::InvalidInputError(_))
        ));
        let empty = Array1::<f64>::zeros(0);
        assert!(matches!(
            search_xy(&empty, &empty, SearchConfig::default()),
            Err(SearchError::InvalidInputError(_))
        ));
        let y = Array1::zeros(5);
        assert!(matches!(
            search_xy(&x, &y, SearchConfig::default().beam_width(0)),
            Err(SearchError::InvalidConfigError(_))
        ));
        let two_columns = Dataset::new(
            ndarray::concatenate![Axis(1), x.clone().insert_axis(Axis(1)), x.insert_axis(Axis(1))],
            y,
        );
        assert!(matches!(
            search(&two_columns, SearchConfig::default()),
            Err(SearchError::InvalidInputError(_))
        ));
    }

    #[cfg(feature = "persistent")]
    #[test]
    #[serial]
    fn test_save_load_result() {
        let (x, y) = noisy_line(15);
        let config = SearchConfig::default().beam_width(1).max_generations(1);
        let res = search_xy(&x, &y, config).unwrap();
        let path = std::env::temp_dir().join("autokernel_search_result.json");
        let path = path.to_string_lossy().to_string();
        res.save(&path).unwrap();
        let loaded = SearchResult::load(&path).unwrap();
        assert_eq!(loaded.incumbent.hash, res.incumbent.hash);
        assert_eq!(loaded.history.len(), res.history.len());
        assert_eq!(loaded.status, res.status);
    }
}
