/// Implementation of `argmin::core::State` for the kernel search
use crate::types::Candidate;
use autokernel_gp::{KernelExpression, KernelHash};

use argmin::core::{Problem, State, TerminationReason, TerminationStatus};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Maintains the state from generation to generation of the [crate::KernelSearchSolver].
///
/// Argmin minimizes costs: the cost of a candidate is the opposite of its score.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchState {
    /// Best expression of the last generation
    pub param: Option<KernelExpression>,
    /// Incumbent expression
    pub best_param: Option<KernelExpression>,
    /// Cost of the best expression of the last generation
    pub cost: Option<f64>,
    /// Incumbent cost
    pub best_cost: Option<f64>,
    /// Target cost
    pub target_cost: f64,

    /// Current iteration (generation)
    pub iter: u64,
    /// Iteration number of last best cost
    pub last_best_iter: u64,
    /// Maximum number of iterations
    pub max_iters: u64,
    /// Evaluation counts
    pub counts: HashMap<String, u64>,
    /// Time required so far
    pub time: Option<web_time::Duration>,
    /// Search status
    pub termination_status: TerminationStatus,

    /// Candidates to expand, best first, at most beam width
    pub frontier: Vec<Candidate>,
    /// Hashes of every expression submitted to a fit, pruned ones included
    pub explored: HashSet<KernelHash>,
    /// Scored candidates in discovery order
    pub history: Vec<Candidate>,
    /// Best candidate so far
    pub incumbent: Option<Candidate>,
    /// Incumbent score after initialization and after each generation
    pub incumbent_trace: Vec<f64>,
    /// Number of expressions created so far
    pub n_discovered: usize,
    /// Number of fits run
    pub n_fits: usize,
    /// Number of candidates whose fit failed
    pub n_pruned: usize,
}

impl SearchState {
    /// Set maximum number of iterations
    ///
    /// # Example
    ///
    /// ```
    /// # use autokernel_search::SearchState;
    /// # use argmin::core::State;
    /// # let state = SearchState::new();
    /// # assert_eq!(state.max_iters, u64::MAX);
    /// let state = state.max_iters(4);
    /// # assert_eq!(state.max_iters, 4);
    /// ```
    #[must_use]
    pub fn max_iters(mut self, iters: u64) -> Self {
        self.max_iters = iters;
        self
    }

    /// Set target cost.
    ///
    /// When this cost is reached, the search stops. The default is `f64::NEG_INFINITY`.
    #[must_use]
    pub fn target_cost(mut self, target_cost: f64) -> Self {
        self.target_cost = target_cost;
        self
    }

    /// Set the best expression of the last generation and its cost
    #[must_use]
    pub fn param(mut self, param: KernelExpression, cost: f64) -> Self {
        self.param = Some(param);
        self.cost = Some(cost);
        self
    }

    /// Candidates to expand in the next generation
    pub fn get_frontier(&self) -> &[Candidate] {
        &self.frontier
    }

    /// Best candidate so far
    pub fn get_incumbent(&self) -> Option<&Candidate> {
        self.incumbent.as_ref()
    }

    /// Whether the expression was already submitted to a fit
    pub fn is_explored(&self, hash: &KernelHash) -> bool {
        self.explored.contains(hash)
    }

    /// Frontier hashes, in frontier order
    pub(crate) fn frontier_hashes(&self) -> Vec<KernelHash> {
        self.frontier.iter().map(|c| c.hash).collect()
    }
}

impl State for SearchState {
    /// Type of parameter
    type Param = KernelExpression;
    /// Floating point precision
    type Float = f64;

    /// Create new `SearchState` instance
    ///
    /// # Example
    ///
    /// ```
    /// # use std::collections::HashMap;
    /// # use argmin::core::{State, TerminationStatus};
    /// use autokernel_search::SearchState;
    /// let state = SearchState::new();
    ///
    /// # assert!(state.param.is_none());
    /// # assert!(state.best_param.is_none());
    /// # assert!(state.frontier.is_empty());
    /// # assert_eq!(state.iter, 0);
    /// # assert_eq!(state.max_iters, u64::MAX);
    /// # assert_eq!(state.counts, HashMap::new());
    /// # assert_eq!(state.termination_status, TerminationStatus::NotTerminated);
    /// ```
    fn new() -> Self {
        SearchState {
            param: None,
            best_param: None,
            cost: None,
            best_cost: None,
            target_cost: f64::NEG_INFINITY,

            iter: 0,
            last_best_iter: 0,
            max_iters: u64::MAX,
            counts: HashMap::new(),
            time: Some(web_time::Duration::new(0, 0)),
            termination_status: TerminationStatus::NotTerminated,

            frontier: vec![],
            explored: HashSet::new(),
            history: vec![],
            incumbent: None,
            incumbent_trace: vec![],
            n_discovered: 0,
            n_fits: 0,
            n_pruned: 0,
        }
    }

    /// Synchronizes best parameter and cost with the incumbent
    fn update(&mut self) {
        if let Some(incumbent) = self.incumbent.as_ref() {
            let cost = -incumbent.score;
            if let Some(best_cost) = self.best_cost {
                if cost < best_cost {
                    self.last_best_iter = self.iter + 1;
                }
            }
            self.best_param = Some(incumbent.expression.clone());
            self.best_cost = Some(cost);
        }
    }

    fn get_param(&self) -> Option<&KernelExpression> {
        self.param.as_ref()
    }

    fn get_best_param(&self) -> Option<&KernelExpression> {
        self.best_param.as_ref()
    }

    fn terminate_with(mut self, reason: TerminationReason) -> Self {
        self.termination_status = TerminationStatus::Terminated(reason);
        self
    }

    fn time(&mut self, time: Option<web_time::Duration>) -> &mut Self {
        self.time = time;
        self
    }

    fn get_cost(&self) -> f64 {
        self.cost.unwrap_or(f64::INFINITY)
    }

    fn get_best_cost(&self) -> f64 {
        self.best_cost.unwrap_or(f64::INFINITY)
    }

    fn get_target_cost(&self) -> f64 {
        self.target_cost
    }

    fn get_iter(&self) -> u64 {
        self.iter
    }

    fn get_last_best_iter(&self) -> u64 {
        self.last_best_iter
    }

    fn get_max_iters(&self) -> u64 {
        self.max_iters
    }

    fn get_termination_status(&self) -> &TerminationStatus {
        &self.termination_status
    }

    fn get_termination_reason(&self) -> Option<&TerminationReason> {
        match &self.termination_status {
            TerminationStatus::Terminated(reason) => Some(reason),
            TerminationStatus::NotTerminated => None,
        }
    }

    fn get_time(&self) -> Option<web_time::Duration> {
        self.time
    }

    fn increment_iter(&mut self) {
        self.iter += 1;
    }

    fn func_counts<O>(&mut self, problem: &Problem<O>) {
        for (k, &v) in problem.counts.iter() {
            let count = self.counts.entry(k.to_string()).or_insert(0);
            *count = v
        }
    }

    fn get_func_counts(&self) -> &HashMap<String, u64> {
        &self.counts
    }

    fn is_best(&self) -> bool {
        self.last_best_iter == self.iter + 1
    }
}
