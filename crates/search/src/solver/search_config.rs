//! Kernel search configuration.
use crate::errors::{Result, SearchError};
use crate::grammar::{Grammar, GrammarSpec};
use crate::scorer::ScoreKind;
use autokernel_gp::{CholeskyLikelihood, KernelSpec, MaximizerKind, GP_DEFAULT_SEED, GP_MAX_EVAL};
use linfa::ParamGuard;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of expressions kept on the frontier
pub const DEFAULT_BEAM_WIDTH: usize = 3;
/// Default number of expansion generations
pub const DEFAULT_MAX_GENERATIONS: usize = 4;
/// Default number of optimizer runs per fit
pub const DEFAULT_RESTARTS_PER_FIT: usize = 3;
/// Default minimal score improvement between two generations
pub const DEFAULT_SCORE_TOLERANCE: f64 = 1e-3;

/// A set of validated search settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidSearchConfig {
    /// Number of expressions kept on the frontier after each generation
    pub(crate) beam_width: usize,
    /// Max number of expansion generations (aka generation budget)
    pub(crate) max_generations: usize,
    /// Number of optimizer runs for each hyperparameters fit
    pub(crate) restarts_per_fit: usize,
    /// Max number of iterations of one optimizer run
    pub(crate) max_eval: usize,
    /// Wall-clock budget of one fit
    pub(crate) per_fit_time_budget: Option<Duration>,
    /// Wall-clock budget of the whole search, checked between generations
    pub(crate) max_time: Option<Duration>,
    /// The search stops when the incumbent score improves by no more than this value
    pub(crate) score_tolerance: f64,
    /// Base kernels used by the grammar
    pub(crate) catalog: KernelSpec,
    /// Moves applied by the grammar
    pub(crate) moves: GrammarSpec,
    /// Score ranking candidates
    pub(crate) score: ScoreKind,
    /// Optimizer used for hyperparameters fits
    pub(crate) maximizer: MaximizerKind,
    /// Nugget relative to the outputs second moment added to noise free covariances
    pub(crate) jitter: f64,
    /// Number of worker threads fitting candidates, 0 means rayon default
    pub(crate) n_workers: usize,
    /// Seed from which the seed of each fit is derived
    pub(crate) seed: u64,
}

impl Default for ValidSearchConfig {
    fn default() -> Self {
        ValidSearchConfig {
            beam_width: DEFAULT_BEAM_WIDTH,
            max_generations: DEFAULT_MAX_GENERATIONS,
            restarts_per_fit: DEFAULT_RESTARTS_PER_FIT,
            max_eval: GP_MAX_EVAL,
            per_fit_time_budget: None,
            max_time: None,
            score_tolerance: DEFAULT_SCORE_TOLERANCE,
            catalog: KernelSpec::DEFAULT,
            moves: GrammarSpec::DEFAULT,
            score: ScoreKind::default(),
            maximizer: MaximizerKind::default(),
            jitter: CholeskyLikelihood::DEFAULT_JITTER,
            n_workers: 0,
            seed: GP_DEFAULT_SEED,
        }
    }
}

impl ValidSearchConfig {
    /// Number of expressions kept on the frontier
    pub fn beam_width(&self) -> usize {
        self.beam_width
    }

    /// Max number of expansion generations
    pub fn max_generations(&self) -> usize {
        self.max_generations
    }

    /// Number of optimizer runs per fit
    pub fn restarts_per_fit(&self) -> usize {
        self.restarts_per_fit
    }

    /// Max number of iterations of one optimizer run
    pub fn max_eval(&self) -> usize {
        self.max_eval
    }

    /// Wall-clock budget of one fit
    pub fn per_fit_time_budget(&self) -> Option<Duration> {
        self.per_fit_time_budget
    }

    /// Wall-clock budget of the search
    pub fn max_time(&self) -> Option<Duration> {
        self.max_time
    }

    /// Minimal score improvement to carry on
    pub fn score_tolerance(&self) -> f64 {
        self.score_tolerance
    }

    /// Grammar of the search
    pub fn grammar(&self) -> Grammar {
        Grammar::new(self.catalog, self.moves)
    }

    /// Score ranking candidates
    pub fn score(&self) -> ScoreKind {
        self.score
    }

    /// Optimizer used for fits
    pub fn maximizer(&self) -> MaximizerKind {
        self.maximizer
    }

    /// Likelihood settings of the fits
    pub fn likelihood(&self) -> CholeskyLikelihood {
        CholeskyLikelihood::default().jitter(self.jitter)
    }

    /// Number of worker threads
    pub fn n_workers(&self) -> usize {
        self.n_workers
    }

    /// Search seed
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

/// Kernel search configuration
///
/// ```
/// use autokernel_search::{GrammarSpec, ScoreKind, SearchConfig};
/// use linfa::ParamGuard;
///
/// let config = SearchConfig::default()
///     .beam_width(2)
///     .max_generations(3)
///     .moves(GrammarSpec::DEFAULT | GrammarSpec::CHANGEPOINT)
///     .score(ScoreKind::Bic)
///     .check()
///     .expect("valid search configuration");
/// assert_eq!(config.beam_width(), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig(ValidSearchConfig);

impl SearchConfig {
    /// Sets the number of expressions kept on the frontier
    pub fn beam_width(mut self, beam_width: usize) -> Self {
        self.0.beam_width = beam_width;
        self
    }

    /// Sets the max number of expansion generations, 0 only fits the base kernels
    pub fn max_generations(mut self, max_generations: usize) -> Self {
        self.0.max_generations = max_generations;
        self
    }

    /// Sets the number of optimizer runs of each fit (warm start included)
    pub fn restarts_per_fit(mut self, restarts: usize) -> Self {
        self.0.restarts_per_fit = restarts;
        self
    }

    /// Sets the max number of iterations of one optimizer run
    pub fn max_eval(mut self, max_eval: usize) -> Self {
        self.0.max_eval = max_eval;
        self
    }

    /// Sets the wall-clock budget of one fit in seconds
    pub fn per_fit_time_budget(mut self, seconds: f64) -> Self {
        self.0.per_fit_time_budget = Duration::try_from_secs_f64(seconds).ok();
        self
    }

    /// Sets the wall-clock budget of the search in seconds
    pub fn max_time(mut self, seconds: f64) -> Self {
        self.0.max_time = Duration::try_from_secs_f64(seconds).ok();
        self
    }

    /// Sets the minimal score improvement between two generations
    pub fn score_tolerance(mut self, tolerance: f64) -> Self {
        self.0.score_tolerance = tolerance;
        self
    }

    /// Sets the base kernels of the grammar
    pub fn catalog(mut self, catalog: KernelSpec) -> Self {
        self.0.catalog = catalog;
        self
    }

    /// Sets the moves of the grammar
    pub fn moves(mut self, moves: GrammarSpec) -> Self {
        self.0.moves = moves;
        self
    }

    /// Sets the score ranking candidates
    pub fn score(mut self, score: ScoreKind) -> Self {
        self.0.score = score;
        self
    }

    /// Sets the optimizer used for fits
    pub fn maximizer(mut self, maximizer: MaximizerKind) -> Self {
        self.0.maximizer = maximizer;
        self
    }

    /// Sets the nugget added to the covariance of expressions without a white noise
    /// term, relative to the second moment of the outputs (0 disables it)
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.0.jitter = jitter;
        self
    }

    /// Sets the number of worker threads fitting candidates, 0 means rayon default
    pub fn n_workers(mut self, n_workers: usize) -> Self {
        self.0.n_workers = n_workers;
        self
    }

    /// Sets the seed for reproducibility
    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = seed;
        self
    }
}

impl From<ValidSearchConfig> for SearchConfig {
    fn from(valid: ValidSearchConfig) -> Self {
        SearchConfig(valid)
    }
}

impl ParamGuard for SearchConfig {
    type Checked = ValidSearchConfig;
    type Error = SearchError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let config = &self.0;
        if config.beam_width == 0 {
            return Err(SearchError::InvalidConfigError(
                "`beam_width` should be at least 1".to_string(),
            ));
        }
        if config.restarts_per_fit == 0 {
            return Err(SearchError::InvalidConfigError(
                "`restarts_per_fit` should be at least 1".to_string(),
            ));
        }
        if config.max_eval == 0 {
            return Err(SearchError::InvalidConfigError(
                "`max_eval` should be at least 1".to_string(),
            ));
        }
        if config.per_fit_time_budget.is_some_and(|t| t.is_zero()) {
            return Err(SearchError::InvalidConfigError(
                "`per_fit_time_budget` should be positive".to_string(),
            ));
        }
        if !(config.score_tolerance >= 0. && config.score_tolerance.is_finite()) {
            return Err(SearchError::InvalidConfigError(format!(
                "`score_tolerance` should be a non negative number, got {}",
                config.score_tolerance
            )));
        }
        if !(config.jitter >= 0. && config.jitter.is_finite()) {
            return Err(SearchError::InvalidConfigError(format!(
                "`jitter` should be a non negative number, got {}",
                config.jitter
            )));
        }
        if config.catalog.is_empty() {
            return Err(SearchError::InvalidConfigError(
                "`catalog` should contain at least one base kernel".to_string(),
            ));
        }
        Ok(config)
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
    fn test_config_check() {
        let valid = SearchConfig::default()
            .beam_width(1)
            .max_generations(0)
            .per_fit_time_budget(0.5)
            .check()
            .unwrap();
        assert_eq!(valid.beam_width(), 1);
        assert_eq!(valid.max_generations(), 0);
        assert_eq!(valid.per_fit_time_budget(), Some(Duration::from_millis(500)));
        assert_eq!(valid.grammar().moves(), GrammarSpec::DEFAULT);

        assert!(SearchConfig::default().beam_width(0).check().is_err());
        assert!(SearchConfig::default().restarts_per_fit(0).check().is_err());
        assert!(SearchConfig::default().score_tolerance(-1.).check().is_err());
        assert!(SearchConfig::default().jitter(f64::NAN).check().is_err());
        assert_eq!(
            SearchConfig::default().jitter(0.).check().unwrap().likelihood().jitter,
            0.
        );
        assert!(SearchConfig::default()
            .per_fit_time_budget(0.)
            .check_ref()
            .is_err());
        assert!(matches!(
            SearchConfig::default().catalog(KernelSpec::empty()).check(),
            Err(SearchError::InvalidConfigError(_))
        ));
    }

    #[test]
    fn test_negative_time_budget_means_unlimited() {
        let valid = SearchConfig::default().max_time(-1.).check().unwrap();
        assert_eq!(valid.max_time(), None);
    }

    #[test]
    fn test_config_serde() {
        let config = SearchConfig::default()
            .catalog(KernelSpec::ALL)
            .moves(GrammarSpec::ALL)
            .score(ScoreKind::Aic)
            .seed(7);
        let json = serde_json::to_string(&config).unwrap();
        let back: SearchConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
