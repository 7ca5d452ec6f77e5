use crate::errors::{GpError, Result};
use crate::expression::KernelExpression;
use crate::kernels::BaseKernelKind;
use crate::likelihood::CholeskyLikelihood;
use crate::optimization::MaximizerKind;
use crate::{GP_DEFAULT_SEED, GP_MAX_EVAL, GP_MIN_EVAL, GP_OPTIM_N_START};
use linfa::ParamGuard;
use std::time::Duration;

#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// A set of validated kernel GP fitting parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct KernelGpValidParams {
    /// Kernel expression to fit, its current hyperparameter values are the warm start
    pub(crate) kernel: KernelExpression,
    /// Number of optimizer runs (warm start included)
    pub(crate) n_start: usize,
    /// Max number of iterations of one optimizer run
    pub(crate) max_eval: usize,
    /// Wall-clock budget of the whole fit
    pub(crate) time_budget: Option<Duration>,
    /// Optimizer used for each run
    pub(crate) maximizer: MaximizerKind,
    /// Seed of the latin hypercube restarts
    pub(crate) seed: u64,
    /// Likelihood evaluation settings
    pub(crate) likelihood: CholeskyLikelihood,
}

impl Default for KernelGpValidParams {
    fn default() -> KernelGpValidParams {
        KernelGpValidParams {
            kernel: KernelExpression::base(BaseKernelKind::SquaredExponential),
            n_start: GP_OPTIM_N_START,
            max_eval: GP_MAX_EVAL,
            time_budget: None,
            maximizer: MaximizerKind::default(),
            seed: GP_DEFAULT_SEED,
            likelihood: CholeskyLikelihood::default(),
        }
    }
}

impl KernelGpValidParams {
    /// Get the kernel expression to fit
    pub fn kernel(&self) -> &KernelExpression {
        &self.kernel
    }

    /// Get the number of optimizer runs
    pub fn n_start(&self) -> usize {
        self.n_start
    }

    /// Get the max number of iterations of one optimizer run
    pub fn max_eval(&self) -> usize {
        self.max_eval
    }

    /// Get the fit time budget
    pub fn time_budget(&self) -> Option<Duration> {
        self.time_budget
    }

    /// Get the optimizer kind
    pub fn maximizer(&self) -> MaximizerKind {
        self.maximizer
    }

    /// Get the restarts seed
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Get likelihood settings
    pub fn likelihood(&self) -> &CholeskyLikelihood {
        &self.likelihood
    }
}

#[derive(Clone, Debug)]
/// The set of parameters that can be specified to fit the hyperparameters
/// of a kernel expression, see [`KernelGp`](crate::KernelGp).
pub struct KernelGpParams(KernelGpValidParams);

impl KernelGpParams {
    /// A constructor for fitting parameters of the given kernel expression
    pub fn new(kernel: KernelExpression) -> KernelGpParams {
        Self(KernelGpValidParams {
            kernel,
            ..Default::default()
        })
    }

    /// A constructor from validated parameters
    pub fn new_from_valid(params: &KernelGpValidParams) -> Self {
        Self(params.clone())
    }

    /// Set the kernel expression
    pub fn kernel(mut self, kernel: KernelExpression) -> Self {
        self.0.kernel = kernel;
        self
    }

    /// Set the number of optimizer runs.
    ///
    /// The first run starts from the current hyperparameter values, the others
    /// from a latin hypercube sample of the hyperparameter bounds.
    pub fn n_start(mut self, n_start: usize) -> Self {
        self.0.n_start = n_start;
        self
    }

    /// Set the max number of iterations of one optimizer run.
    /// Given max_eval is raised to [crate::GP_MIN_EVAL] if lower.
    pub fn max_eval(mut self, max_eval: usize) -> Self {
        self.0.max_eval = GP_MIN_EVAL.max(max_eval);
        self
    }

    /// Set the wall-clock budget of the fit, `None` means unlimited
    pub fn time_budget(mut self, time_budget: Option<Duration>) -> Self {
        self.0.time_budget = time_budget;
        self
    }

    /// Set the optimizer kind
    pub fn maximizer(mut self, maximizer: MaximizerKind) -> Self {
        self.0.maximizer = maximizer;
        self
    }

    /// Set the seed used to draw restart points
    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = seed;
        self
    }

    /// Set the likelihood settings (jitter, conditioning threshold)
    pub fn likelihood(mut self, likelihood: CholeskyLikelihood) -> Self {
        self.0.likelihood = likelihood;
        self
    }
}

impl From<KernelGpValidParams> for KernelGpParams {
    fn from(valid: KernelGpValidParams) -> Self {
        KernelGpParams(valid)
    }
}

impl ParamGuard for KernelGpParams {
    type Checked = KernelGpValidParams;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        if self.0.n_start == 0 {
            return Err(GpError::InvalidValueError(
                "`n_start` should be at least 1".to_string(),
            ));
        }
        if let Some(budget) = self.0.time_budget {
            if budget.is_zero() {
                return Err(GpError::InvalidValueError(
                    "`time_budget` should be positive".to_string(),
                ));
            }
        }
        let lkh = &self.0.likelihood;
        if !(lkh.jitter >= 0. && lkh.jitter.is_finite()) || !(lkh.min_pivot_ratio >= 0.) {
            return Err(GpError::InvalidValueError(format!(
                "Bad likelihood settings: jitter {}, min pivot ratio {}",
                lkh.jitter, lkh.min_pivot_ratio
            )));
        }
        self.0.kernel.check_domain()?;
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_check() {
        let params = KernelGpParams::new(KernelExpression::base(BaseKernelKind::Periodic))
            .n_start(0);
        assert!(matches!(
            params.check(),
            Err(GpError::InvalidValueError(_))
        ));

        let params = KernelGpParams::new(KernelExpression::base(BaseKernelKind::Periodic))
            .time_budget(Some(Duration::ZERO));
        assert!(params.check_ref().is_err());

        let params = KernelGpParams::new(KernelExpression::base(BaseKernelKind::Linear))
            .likelihood(CholeskyLikelihood::default().jitter(-1.));
        assert!(params.check_ref().is_err());

        let valid = KernelGpParams::new(KernelExpression::base(BaseKernelKind::Linear))
            .n_start(3)
            .max_eval(2)
            .check()
            .unwrap();
        assert_eq!(valid.n_start(), 3);
        assert_eq!(valid.max_eval(), GP_MIN_EVAL);
    }
}
