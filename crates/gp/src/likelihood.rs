//! Log marginal likelihood of a zero-mean GP with a [`KernelExpression`] covariance.

use crate::errors::{GpError, Result};
use crate::expression::KernelExpression;
use linfa_linalg::{cholesky::*, triangular::*};
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix1, Zip};
use ndarray_stats::QuantileExt;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// `0.5 * ln(2 pi)`
pub(crate) const HALF_LN_2PI: f64 = 0.918_938_533_204_672_7;

/// GP-evaluation collaborator: log marginal likelihood and its gradient.
///
/// Implementations must fail with [`GpError::LikelihoodComputationError`] on a
/// non positive definite covariance rather than return a non-finite value.
pub trait LikelihoodEvaluator: Send + Sync {
    /// Returns `(log p(y | x, kernel), d log p / d t)` where `t` are the free
    /// hyperparameters of `kernel` in optimization coordinates
    fn log_marginal_likelihood(
        &self,
        kernel: &KernelExpression,
        x: &ArrayView1<f64>,
        y: &ArrayView1<f64>,
    ) -> Result<(f64, Array1<f64>)>;
}

/// Factorized covariance of the training data
#[derive(Clone, Debug)]
pub(crate) struct Factorization {
    /// Lower Cholesky factor of K
    pub chol: Array2<f64>,
    /// K^-1 y
    pub alpha: Array1<f64>,
    /// log p(y)
    pub lml: f64,
}

/// Exact likelihood through the Cholesky factorization of the covariance matrix.
///
/// Covariances of expressions without a white noise summand are rank deficient on dense
/// inputs: they get a nugget `jitter * mean(y^2)` on their diagonal. The nugget does not
/// depend on the hyperparameters. A white noise summand is bounded away from zero and
/// regularizes the covariance itself, so it can model less noise than the nugget.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct CholeskyLikelihood {
    /// Nugget relative to the second moment of the outputs
    pub jitter: f64,
    /// Smallest accepted ratio between the squared Cholesky pivots and the largest
    /// covariance diagonal entry; below it the covariance is deemed singular
    pub min_pivot_ratio: f64,
}

impl CholeskyLikelihood {
    /// Default relative nugget, ten times the white noise variance floor
    pub const DEFAULT_JITTER: f64 = 1e-5;
}

impl Default for CholeskyLikelihood {
    fn default() -> Self {
        CholeskyLikelihood {
            jitter: Self::DEFAULT_JITTER,
            min_pivot_ratio: 1e-12,
        }
    }
}

impl CholeskyLikelihood {
    /// Sets the relative nugget, 0 disables it
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets the conditioning threshold
    pub fn min_pivot_ratio(mut self, ratio: f64) -> Self {
        self.min_pivot_ratio = ratio;
        self
    }

    /// Nugget added to the covariance of `kernel` for outputs `y`
    pub fn nugget(
        &self,
        kernel: &KernelExpression,
        y: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> f64 {
        if kernel.has_noise_summand() || y.is_empty() {
            return 0.;
        }
        let moment = y.dot(y) / y.len() as f64;
        let scale = if moment > 0. && moment.is_finite() {
            moment
        } else {
            1.
        };
        self.jitter * scale
    }

    /// Factorizes the covariance `k` of `kernel` and solves against `y`
    pub(crate) fn factorize(
        &self,
        kernel: &KernelExpression,
        mut k: Array2<f64>,
        y: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<Factorization> {
        let n = y.len();
        if k.iter().any(|v| !v.is_finite()) {
            return Err(GpError::LikelihoodComputationError(
                "covariance has non finite entries".to_string(),
            ));
        }
        let nugget = self.nugget(kernel, y);
        if nugget > 0. {
            k.diag_mut().mapv_inplace(|v| v + nugget);
        }
        let chol = k.cholesky().map_err(|e| {
            GpError::LikelihoodComputationError(format!("cholesky failed: {e}"))
        })?;

        let max_diag = *k.diag().max().map_err(|_| {
            GpError::LikelihoodComputationError("undefined covariance diagonal".to_string())
        })?;
        let min_pivot = *chol.diag().mapv(|v| v * v).min().map_err(|_| {
            GpError::LikelihoodComputationError("undefined cholesky pivots".to_string())
        })?;
        if !(min_pivot > self.min_pivot_ratio * max_diag) {
            return Err(GpError::LikelihoodComputationError(format!(
                "covariance is too ill conditioned (pivot ratio {:e})",
                min_pivot / max_diag
            )));
        }

        let y2 = y.to_owned().insert_axis(Axis(1));
        let z = chol.solve_triangular(&y2, UPLO::Lower)?;
        let alpha = chol.t().solve_triangular(&z, UPLO::Upper)?;
        let alpha = alpha.column(0).to_owned();

        let data_fit = -0.5 * y.dot(&alpha);
        let log_det = chol.diag().mapv(|v| v.ln()).sum();
        let lml = data_fit - log_det - n as f64 * HALF_LN_2PI;
        if !lml.is_finite() {
            return Err(GpError::LikelihoodComputationError(format!(
                "non finite log likelihood {lml}"
            )));
        }
        Ok(Factorization { chol, alpha, lml })
    }
}

impl LikelihoodEvaluator for CholeskyLikelihood {
    fn log_marginal_likelihood(
        &self,
        kernel: &KernelExpression,
        x: &ArrayView1<f64>,
        y: &ArrayView1<f64>,
    ) -> Result<(f64, Array1<f64>)> {
        let n = y.len();
        let (k, grads) = kernel.value_and_gradients(x)?;
        let fact = self.factorize(kernel, k, y)?;

        // d lml / d t = 0.5 tr((alpha alpha^T - K^-1) dK/dt)
        let linv = fact.chol.solve_triangular(&Array2::eye(n), UPLO::Lower)?;
        let kinv = linv.t().dot(&linv);
        let mut w = Array2::zeros((n, n));
        Zip::indexed(&mut w)
            .and(&kinv)
            .for_each(|(i, j), v, &kij| *v = fact.alpha[i] * fact.alpha[j] - kij);
        let grad = grads
            .iter()
            .map(|dk| 0.5 * (&w * dk).sum())
            .collect::<Array1<f64>>();
        if grad.iter().any(|g| !g.is_finite()) {
            return Err(GpError::LikelihoodComputationError(
                "non finite likelihood gradient".to_string(),
            ));
        }
        Ok((fact.lml, grad))
    }
}
