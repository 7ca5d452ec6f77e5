//! Kernel structure search implemented as an [argmin::core::Solver] to benefit from
//! the features of the argmin framework such as observers or checkpointing.
//!
//! Note: [`KernelSearch`](crate::KernelSearch) wraps the `argmin::core::Executor` running a
//! `KernelSearchSolver` on a `KernelFitProblem`.
//!
//! ```no_run
//! use argmin::core::Executor;
//! use autokernel_search::{KernelFitProblem, KernelSearchSolver, SearchConfig};
//! use linfa::prelude::*;
//! use ndarray::{Array1, Axis};
//!
//! let x = Array1::linspace(0., 10., 100);
//! let y = x.mapv(|v| (2. * std::f64::consts::PI * v).sin());
//! let problem = KernelFitProblem::new(&Dataset::new(x.insert_axis(Axis(1)), y))
//!     .expect("valid dataset");
//! let config = SearchConfig::default()
//!     .beam_width(2)
//!     .check()
//!     .expect("search configuration validated");
//! let res = Executor::new(problem, KernelSearchSolver::new(config))
//!     .configure(|state| state.max_iters(3))
//!     .run()
//!     .expect("kernel search");
//! println!("Best kernel = {:?}", res.state.best_param);
//! ```
//!
use crate::errors::SearchError;
use crate::solver::{KernelFitProblem, SearchState, ValidSearchConfig};
use crate::types::Candidate;
use autokernel_gp::{
    BaseKernel, KernelExpression, KernelGp, KernelGpParams,
    LikelihoodEvaluator,
};

use argmin::core::{CostFunction, Problem, Solver, State, TerminationReason, TerminationStatus, KV};
use env_logger::{Builder, Env};
use log::{debug, info, warn};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use web_time::Instant;

/// Environment variable filtering search logs (default `info`)
pub const AUTOKERNEL_LOG: &str = "AUTOKERNEL_LOG";

type SolverResult<T> = std::result::Result<T, argmin::core::Error>;

/// Implementation of `argmin::core::Solver` for the greedy beam search over kernel
/// expressions. Each iteration is a generation: the frontier is expanded by the
/// grammar, new expressions are fitted in parallel and the best ones are kept.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KernelSearchSolver {
    pub(crate) config: ValidSearchConfig,
}

impl KernelSearchSolver {
    /// Constructor of the search with the given validated configuration
    pub fn new(config: ValidSearchConfig) -> Self {
        let env = Env::new().filter_or(AUTOKERNEL_LOG, "info");
        let mut builder = Builder::from_env(env);
        let builder = builder.target(env_logger::Target::Stdout);
        builder.try_init().ok();
        KernelSearchSolver { config }
    }

    /// Search configuration
    pub fn config(&self) -> &ValidSearchConfig {
        &self.config
    }

    /// Fit settings of `expr`, its seed only depends on the search seed and the structure
    fn fit_params(&self, expr: &KernelExpression) -> KernelGpParams {
        KernelGpParams::new(expr.clone())
            .n_start(self.config.restarts_per_fit)
            .max_eval(self.config.max_eval)
            .time_budget(self.config.per_fit_time_budget)
            .maximizer(self.config.maximizer)
            .likelihood(self.config.likelihood())
            .seed(self.config.seed ^ expr.canonical_hash().as_u64())
    }

    /// Fits expressions in parallel, outcomes come back in input order (None when the fit failed)
    fn evaluate(
        &self,
        problem: &mut Problem<KernelFitProblem>,
        exprs: &[KernelExpression],
    ) -> SolverResult<Vec<Option<KernelGp>>> {
        let pb = problem.problem.as_ref().ok_or_else(missing_problem)?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.config.n_workers)
            .build()
            .map_err(SearchError::from)?;
        let params: Vec<KernelGpParams> = exprs.iter().map(|e| self.fit_params(e)).collect();
        let fits = pool.install(|| {
            params
                .par_iter()
                .zip(exprs.par_iter())
                .map(|(p, expr)| {
                    let now = Instant::now();
                    match pb.cost(p) {
                        Ok(gp) => {
                            debug!(
                                "Fit {:#} in {:.3}s: lml={:.4} ({:?})",
                                gp.kernel(),
                                now.elapsed().as_secs_f64(),
                                gp.log_likelihood(),
                                gp.status()
                            );
                            Some(gp)
                        }
                        Err(err) => {
                            warn!("Prune {expr:#}: {err}");
                            None
                        }
                    }
                })
                .collect::<Vec<_>>()
        });
        *problem.counts.entry("cost_count").or_insert(0) += exprs.len() as u64;
        Ok(fits)
    }

    /// Best `beam_width` candidates of the old frontier and the new candidates
    fn select(&self, mut frontier: Vec<Candidate>, new: Vec<Candidate>) -> Vec<Candidate> {
        frontier.extend(new);
        frontier.sort_by(Candidate::ranking_order);
        frontier.truncate(self.config.beam_width);
        frontier
    }

    /// Base kernel with the highest likelihood at its prior modes, used when no fit succeeded
    fn fallback(&self, pb: &KernelFitProblem, exprs: &[KernelExpression]) -> Option<Candidate> {
        let evaluator = self.config.likelihood();
        let (x, y) = (pb.x(), pb.y());
        exprs
            .iter()
            .enumerate()
            .map(|(i, expr)| {
                let lml = evaluator
                    .log_marginal_likelihood(expr, &x, &y)
                    .map(|(lml, _)| lml)
                    .ok()
                    .filter(|lml| lml.is_finite())
                    .unwrap_or(f64::NEG_INFINITY);
                Candidate::unfitted(expr.clone(), lml, &self.config.score, pb.n_points(), i)
            })
            .min_by(Candidate::ranking_order)
    }
}

fn missing_problem() -> SearchError {
    SearchError::InvalidInputError("Kernel fit problem is not available".to_string())
}

impl Solver<KernelFitProblem, SearchState> for KernelSearchSolver {
    const NAME: &'static str = "KernelSearch";

    fn init(
        &mut self,
        problem: &mut Problem<KernelFitProblem>,
        mut state: SearchState,
    ) -> SolverResult<(SearchState, Option<KV>)> {
        let pb = problem.problem.as_ref().ok_or_else(missing_problem)?;
        let n_points = pb.n_points();
        let exprs: Vec<KernelExpression> = self
            .config
            .catalog
            .kinds()
            .into_iter()
            .map(|kind| BaseKernel::from_priors(kind, pb.constraints()).into())
            .collect();
        info!(
            "Fit {} base kernels on {} points ({} workers)",
            exprs.len(),
            n_points,
            self.config.n_workers
        );
        let fits = self.evaluate(problem, &exprs)?;

        state.max_iters = self.config.max_generations as u64;
        state.n_fits = exprs.len();
        let mut candidates = vec![];
        for (expr, fit) in exprs.iter().zip(fits) {
            state.explored.insert(expr.canonical_hash());
            let discovery = state.n_discovered;
            state.n_discovered += 1;
            match fit {
                Some(gp) => candidates.push(Candidate::from_model(
                    gp,
                    &self.config.score,
                    None,
                    0,
                    discovery,
                )),
                None => state.n_pruned += 1,
            }
        }

        if candidates.is_empty() {
            let pb = problem.problem.as_ref().ok_or_else(missing_problem)?;
            let fallback = self.fallback(pb, &exprs).ok_or_else(|| {
                SearchError::InvalidConfigError("Empty base kernel catalog".to_string())
            })?;
            warn!("Every base kernel fit failed, fall back to {fallback}");
            state = state.param(fallback.expression.clone(), -fallback.score);
            state.incumbent_trace.push(fallback.score);
            state.history.push(fallback.clone());
            state.frontier = vec![fallback.clone()];
            state.incumbent = Some(fallback);
            // an unfitted expression is not expanded
            return Ok((state.terminate_with(TerminationReason::SolverConverged), None));
        }

        state.history = candidates.iter().map(Candidate::without_model).collect();
        state.frontier = self.select(vec![], candidates);
        if let Some(best) = state.frontier.first().cloned() {
            info!("********* Initialization: best {best}");
            state = state.param(best.expression.clone(), -best.score);
            state.incumbent_trace.push(best.score);
            state.incumbent = Some(best);
        }
        debug!(
            "Initial frontier: {:?}",
            state
                .frontier
                .iter()
                .map(|c| c.expression.to_string())
                .collect::<Vec<_>>()
        );
        Ok((state, None))
    }

    fn next_iter(
        &mut self,
        problem: &mut Problem<KernelFitProblem>,
        mut state: SearchState,
    ) -> SolverResult<(SearchState, Option<KV>)> {
        let generation = state.get_iter() + 1;
        debug!(
            "********* Start generation {}/{}",
            generation,
            state.get_max_iters()
        );
        let now = Instant::now();

        let constraints = problem
            .problem
            .as_ref()
            .ok_or_else(missing_problem)?
            .constraints()
            .clone();
        let grammar = self.config.grammar();
        let mut exprs = vec![];
        let mut parents = vec![];
        for parent in state.frontier.iter() {
            for expr in grammar.expand(&parent.expression, &constraints) {
                if state.explored.insert(expr.canonical_hash()) {
                    parents.push(parent.expression.clone());
                    exprs.push(expr);
                }
            }
        }
        if exprs.is_empty() {
            info!(
                "********* End generation {}/{}: nothing left to expand",
                generation,
                state.get_max_iters()
            );
            return Ok((state.terminate_with(TerminationReason::SolverConverged), None));
        }

        let fits = self.evaluate(problem, &exprs)?;
        state.n_fits += exprs.len();
        let mut new = vec![];
        for (parent, fit) in parents.into_iter().zip(fits) {
            let discovery = state.n_discovered;
            state.n_discovered += 1;
            match fit {
                Some(gp) => new.push(Candidate::from_model(
                    gp,
                    &self.config.score,
                    Some(parent),
                    generation,
                    discovery,
                )),
                None => state.n_pruned += 1,
            }
        }
        let n_new = new.len();
        state
            .history
            .extend(new.iter().map(Candidate::without_model));
        if let Some(best_new) = new.iter().min_by(|a, b| Candidate::ranking_order(a, b)) {
            state = state.param(best_new.expression.clone(), -best_new.score);
        }

        let prev_frontier: HashSet<_> = state.frontier_hashes().into_iter().collect();
        let prev_score = state.incumbent.as_ref().map(|c| c.score);
        let frontier = std::mem::take(&mut state.frontier);
        state.frontier = self.select(frontier, new);
        state.incumbent = state.frontier.first().cloned();
        let score = state
            .incumbent
            .as_ref()
            .map_or(f64::NEG_INFINITY, |c| c.score);
        state.incumbent_trace.push(score);

        info!(
            "********* End generation {}/{} in {:.3}s: {} fitted, {} pruned, best {}",
            generation,
            state.get_max_iters(),
            now.elapsed().as_secs_f64(),
            n_new,
            exprs.len() - n_new,
            state
                .incumbent
                .as_ref()
                .map_or("none".to_string(), |c| c.to_string())
        );

        let frontier: HashSet<_> = state.frontier_hashes().into_iter().collect();
        if frontier == prev_frontier {
            info!("Frontier unchanged");
            return Ok((state.terminate_with(TerminationReason::SolverConverged), None));
        }
        let improvement = prev_score.map_or(f64::INFINITY, |prev| score - prev);
        if improvement <= self.config.score_tolerance {
            info!("Score improvement {improvement:.3e} below tolerance");
            return Ok((state.terminate_with(TerminationReason::SolverConverged), None));
        }
        Ok((state, None))
    }

    fn terminate(&mut self, state: &SearchState) -> TerminationStatus {
        if let (Some(max_time), Some(elapsed)) = (self.config.max_time, state.get_time()) {
            if elapsed >= max_time {
                info!(
                    "Search time budget of {:.3}s exhausted",
                    max_time.as_secs_f64()
                );
                return TerminationStatus::Terminated(TerminationReason::SolverExit(
                    "time budget exhausted".to_string(),
                ));
            }
        }
        TerminationStatus::NotTerminated
    }
}
