//! Bounded maximizers used to fit kernel hyperparameters, and multistart preparation.

use crate::errors::Result;
use egobox_doe::{Lhs, LhsKind, SamplingMethod};
use ndarray::{s, Array1, Array2};
use ndarray_rand::rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use std::cell::{Cell, RefCell};
use web_time::Instant;

#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Objective to maximize: value and gradient at a point
pub type Objective<'a> = dyn Fn(&[f64]) -> Result<(f64, Array1<f64>)> + 'a;

/// Outcome of an optimizer run
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum ConvergenceStatus {
    /// A local maximum was reached within tolerances
    Converged,
    /// Iteration or time budget exhausted before convergence
    MaxIterExceeded,
    /// The objective could not be evaluated (ill-conditioning, overflow)
    NumericalFailure,
}

/// Result of a maximization run
#[derive(Clone, Debug)]
pub struct MaximizerOutcome {
    /// Best point found
    pub x: Array1<f64>,
    /// Objective value at `x`
    pub value: f64,
    /// Convergence diagnostic
    pub status: ConvergenceStatus,
    /// Number of iterations (or objective evaluations) used
    pub n_iters: usize,
}

impl MaximizerOutcome {
    fn failure(x: &[f64]) -> Self {
        MaximizerOutcome {
            x: Array1::from(x.to_vec()),
            value: f64::NEG_INFINITY,
            status: ConvergenceStatus::NumericalFailure,
            n_iters: 0,
        }
    }
}

/// Numerical optimizer collaborator: bounded maximization of an objective.
///
/// The `deadline`, when given, is checked at every iteration; once passed, the run
/// stops and reports [`ConvergenceStatus::MaxIterExceeded`] with the best point so far.
pub trait Maximizer: Send + Sync {
    /// Maximizes `objective` starting from `x0` within box `bounds`
    fn maximize(
        &self,
        objective: &Objective,
        x0: &[f64],
        bounds: &[(f64, f64)],
        deadline: Option<Instant>,
    ) -> MaximizerOutcome;
}

/// Available maximizers
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum MaximizerKind {
    /// SLSQP gradient-based method (uses the likelihood gradient)
    #[default]
    Slsqp,
    /// COBYLA derivative-free method
    Cobyla,
}

impl MaximizerKind {
    /// Maximizer of this kind allowed `max_eval` objective evaluations
    pub fn build(&self, max_eval: usize) -> Box<dyn Maximizer> {
        match self {
            MaximizerKind::Slsqp => Box::new(SlsqpMaximizer {
                maxeval: max_eval,
                ..SlsqpMaximizer::default()
            }),
            MaximizerKind::Cobyla => Box::new(CobylaMaximizer {
                maxeval: max_eval,
                ..CobylaMaximizer::default()
            }),
        }
    }
}

fn is_expired(deadline: Option<Instant>) -> bool {
    deadline.map_or(false, |d| Instant::now() >= d)
}

fn project(x: &Array1<f64>, bounds: &[(f64, f64)]) -> Array1<f64> {
    x.iter()
        .zip(bounds)
        .map(|(v, (lo, up))| v.clamp(*lo, *up))
        .collect()
}

/// Objective wrapper recording the best evaluation of a run.
///
/// Once the deadline has passed and a finite value is known, evaluations are not
/// computed anymore: the best value is returned with a zero gradient, so that the
/// optimizer sees a flat objective and stops.
struct BestTracker<'a> {
    objective: &'a Objective<'a>,
    deadline: Option<Instant>,
    best: RefCell<Option<(Vec<f64>, f64)>>,
    n_evals: Cell<usize>,
    expired: Cell<bool>,
}

impl<'a> BestTracker<'a> {
    fn new(objective: &'a Objective<'a>, deadline: Option<Instant>) -> Self {
        BestTracker {
            objective,
            deadline,
            best: RefCell::new(None),
            n_evals: Cell::new(0),
            expired: Cell::new(false),
        }
    }

    /// Value and gradient at `x`, None when the objective cannot be evaluated
    fn eval(&self, x: &[f64]) -> Option<(f64, Array1<f64>)> {
        if let Some((_, f)) = self.best.borrow().as_ref() {
            if self.expired.get() || is_expired(self.deadline) {
                self.expired.set(true);
                return Some((*f, Array1::zeros(x.len())));
            }
        }
        self.n_evals.set(self.n_evals.get() + 1);
        match (self.objective)(x) {
            Ok((f, g)) if f.is_finite() => {
                let mut best = self.best.borrow_mut();
                if best.as_ref().map_or(true, |(_, fb)| f > *fb) {
                    *best = Some((x.to_vec(), f));
                }
                Some((f, g))
            }
            _ => None,
        }
    }

    /// Negated objective, the gradient slot is filled when requested
    fn negated(&self, x: &[f64], grad: Option<&mut [f64]>) -> f64 {
        match self.eval(x) {
            Some((f, g)) => {
                if let Some(grad) = grad {
                    grad.iter_mut().zip(g.iter()).for_each(|(d, v)| *d = -v);
                }
                -f
            }
            None => {
                if let Some(grad) = grad {
                    grad.iter_mut().for_each(|d| *d = 0.);
                }
                f64::INFINITY
            }
        }
    }

    /// Outcome of the run, `converged` being the diagnostic of the optimizer itself
    fn outcome(self, converged: bool, maxeval: usize, x0: &[f64]) -> MaximizerOutcome {
        let n_iters = self.n_evals.get();
        let status = if converged && !self.expired.get() && n_iters < maxeval {
            ConvergenceStatus::Converged
        } else {
            ConvergenceStatus::MaxIterExceeded
        };
        match self.best.into_inner() {
            Some((x, value)) => MaximizerOutcome {
                x: Array1::from(x),
                value,
                status,
                n_iters,
            },
            None => MaximizerOutcome::failure(x0),
        }
    }
}

/// SLSQP parameters, the gradient-based method
#[derive(Clone, Copy, Debug)]
pub struct SlsqpMaximizer {
    /// Relative tolerance on the objective
    pub ftol_rel: f64,
    /// Absolute tolerance on the objective
    pub ftol_abs: f64,
    /// Maximum number of objective evaluations
    pub maxeval: usize,
}

impl Default for SlsqpMaximizer {
    fn default() -> Self {
        SlsqpMaximizer {
            ftol_rel: 1e-8,
            ftol_abs: 0.,
            maxeval: 200,
        }
    }
}

impl Maximizer for SlsqpMaximizer {
    fn maximize(
        &self,
        objective: &Objective,
        x0: &[f64],
        bounds: &[(f64, f64)],
        deadline: Option<Instant>,
    ) -> MaximizerOutcome {
        let tracker = BestTracker::new(objective, deadline);
        let cons: Vec<&dyn slsqp::Func<()>> = vec![];
        let xinit = project(&Array1::from(x0.to_vec()), bounds).to_vec();

        let res = slsqp::minimize(
            |x: &[f64], grad: Option<&mut [f64]>, _u: &mut ()| tracker.negated(x, grad),
            &xinit,
            bounds,
            &cons,
            (),
            self.maxeval,
            Some(slsqp::StopTols {
                ftol_rel: self.ftol_rel,
                ftol_abs: self.ftol_abs,
                ..slsqp::StopTols::default()
            }),
        );
        let converged = match res {
            Ok(_) => true,
            Err((status, _, _)) => {
                log::debug!("Slsqp optimizer stopped in kernel fit status={status:?}");
                false
            }
        };
        tracker.outcome(converged, self.maxeval, x0)
    }
}

/// COBYLA parameters, the derivative-free alternative
#[derive(Clone, Copy, Debug)]
pub struct CobylaMaximizer {
    /// Initial trust region radius
    pub rhobeg: f64,
    /// Relative tolerance on the objective
    pub ftol_rel: f64,
    /// Maximum number of objective evaluations
    pub maxeval: usize,
}

impl Default for CobylaMaximizer {
    fn default() -> Self {
        CobylaMaximizer {
            rhobeg: 0.5,
            ftol_rel: 1e-4,
            maxeval: 200,
        }
    }
}

impl Maximizer for CobylaMaximizer {
    fn maximize(
        &self,
        objective: &Objective,
        x0: &[f64],
        bounds: &[(f64, f64)],
        deadline: Option<Instant>,
    ) -> MaximizerOutcome {
        use cobyla::{minimize, Func, StopTols};

        let tracker = BestTracker::new(objective, deadline);
        let cons: Vec<&dyn Func<()>> = vec![];
        let param0 = project(&Array1::from(x0.to_vec()), bounds).to_vec();

        let res = minimize(
            |x: &[f64], _u: &mut ()| tracker.negated(x, None),
            &param0,
            bounds,
            &cons,
            (),
            self.maxeval,
            cobyla::RhoBeg::All(self.rhobeg),
            Some(StopTols {
                ftol_rel: self.ftol_rel,
                ..StopTols::default()
            }),
        );
        let converged = match res {
            Ok(_) => true,
            Err((status, _, _)) => {
                log::warn!("ERROR Cobyla optimizer in kernel fit status={status:?}");
                false
            }
        };
        tracker.outcome(converged, self.maxeval, x0)
    }
}

/// Starting points for a multistart optimization: row 0 is `x0` (warm start), the
/// `n_start - 1` other rows are a maximin Latin hypercube sample of the box `bounds`.
pub(crate) fn prepare_multistart(
    n_start: usize,
    x0: &Array1<f64>,
    bounds: &[(f64, f64)],
    seed: u64,
) -> Array2<f64> {
    let n_start = n_start.max(1);
    let dim = x0.len();
    let mut starts = Array2::zeros((n_start, dim));
    starts.row_mut(0).assign(&project(x0, bounds));

    let n_lhs = n_start - 1;
    if n_lhs > 0 && dim > 0 {
        let xlimits: Array2<f64> =
            Array2::from_shape_fn((dim, 2), |(i, j)| if j == 0 { bounds[i].0 } else { bounds[i].1 });
        // maximin needs at least two points to compare distances
        let kind = if n_lhs > 1 {
            LhsKind::Maximin
        } else {
            LhsKind::Classic
        };
        let seeds = Lhs::new(&xlimits)
            .kind(kind)
            .with_rng(Xoshiro256Plus::seed_from_u64(seed))
            .sample(n_lhs);
        starts.slice_mut(s![1.., ..]).assign(&seeds);
    }
    starts
}
