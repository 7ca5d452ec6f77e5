//! Model selection scores of fitted kernel expressions.
//!
//! Scores are to be maximized. The default [ScoreKind::Bic] is the Bayesian information
//! criterion written as a penalized log marginal likelihood,
//! `lml - 0.5 * k * ln(n)` where `k` is the number of free hyperparameters and
//! `n` the number of observations. It is a large sample approximation of the log
//! model evidence, it ignores the prior over hyperparameters.

use serde::{Deserialize, Serialize};

/// A score ranking fitted kernel expressions, higher is better
pub trait Scorer {
    /// Score of an expression with `n_params` free hyperparameters reaching the log
    /// marginal likelihood `lml` on `n_points` observations
    fn score(&self, lml: f64, n_params: usize, n_points: usize) -> f64;
}

/// Available scores
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreKind {
    /// Bayesian information criterion `lml - 0.5 * k * ln(n)`
    #[default]
    Bic,
    /// Akaike information criterion `lml - k`
    Aic,
    /// Unpenalized log marginal likelihood
    LogLikelihood,
}

impl Scorer for ScoreKind {
    fn score(&self, lml: f64, n_params: usize, n_points: usize) -> f64 {
        let k = n_params as f64;
        match self {
            ScoreKind::Bic => lml - 0.5 * k * (n_points.max(1) as f64).ln(),
            ScoreKind::Aic => lml - k,
            ScoreKind::LogLikelihood => lml,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_scores() {
        assert_abs_diff_eq!(
            ScoreKind::Bic.score(-10., 4, 100),
            -10. - 2. * 100f64.ln(),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(ScoreKind::Aic.score(-10., 4, 100), -14.);
        assert_abs_diff_eq!(ScoreKind::LogLikelihood.score(-10., 4, 100), -10.);
        assert_eq!(ScoreKind::default(), ScoreKind::Bic);
    }

    #[test]
    fn test_bic_penalizes_parameters() {
        let simple = ScoreKind::Bic.score(-10., 2, 50);
        let complex = ScoreKind::Bic.score(-9., 5, 50);
        assert!(simple > complex);
        // a single observation carries no penalty
        assert_abs_diff_eq!(ScoreKind::Bic.score(-1., 3, 1), -1.);
    }
}
