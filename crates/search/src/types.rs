use crate::scorer::Scorer;
use autokernel_gp::{ConvergenceStatus, KernelExpression, KernelGp, KernelHash};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[cfg(feature = "persistent")]
use crate::errors::Result;
#[cfg(feature = "persistent")]
use std::{fs, io::Write};

/// A scored kernel expression
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Candidate {
    /// Expression with fitted hyperparameters
    pub expression: KernelExpression,
    /// Fitted free hyperparameters (natural units, tree order)
    pub params: Vec<f64>,
    /// Log marginal likelihood at the fitted hyperparameters
    pub lml: f64,
    /// Model selection score, higher is better
    pub score: f64,
    /// Number of free hyperparameters
    pub n_params: usize,
    /// Convergence status of the hyperparameters fit
    pub status: ConvergenceStatus,
    /// Expression this candidate was expanded from (None for base kernels)
    pub parent: Option<KernelExpression>,
    /// Generation in which the candidate was created (0 for base kernels)
    pub generation: u64,
    /// Global creation index
    pub discovery: usize,
    /// Canonical structural hash of the expression
    pub hash: KernelHash,
    /// Fitted GP, only kept while the candidate is on the frontier
    pub model: Option<KernelGp>,
}

impl Candidate {
    /// Candidate from a fitted GP
    pub fn from_model(
        gp: KernelGp,
        scorer: &impl Scorer,
        parent: Option<KernelExpression>,
        generation: u64,
        discovery: usize,
    ) -> Self {
        let expression = gp.kernel().clone();
        let n_params = expression.n_params();
        let n_points = gp.training_data().0.len();
        let lml = gp.log_likelihood();
        Candidate {
            params: expression.params(),
            lml,
            score: scorer.score(lml, n_params, n_points),
            n_params,
            status: gp.status(),
            parent,
            generation,
            discovery,
            hash: expression.canonical_hash(),
            expression,
            model: Some(gp),
        }
    }

    /// Candidate whose hyperparameters could not be fitted, scored at their current values
    pub fn unfitted(
        expression: KernelExpression,
        lml: f64,
        scorer: &impl Scorer,
        n_points: usize,
        discovery: usize,
    ) -> Self {
        let n_params = expression.n_params();
        Candidate {
            params: expression.params(),
            lml,
            score: scorer.score(lml, n_params, n_points),
            n_params,
            status: ConvergenceStatus::NumericalFailure,
            parent: None,
            generation: 0,
            discovery,
            hash: expression.canonical_hash(),
            expression,
            model: None,
        }
    }

    /// A copy of the candidate without its fitted GP
    pub fn without_model(&self) -> Self {
        Candidate {
            model: None,
            ..self.clone()
        }
    }

    /// Ranking order: higher score first, then fewer free hyperparameters, then earlier
    /// discovery
    pub fn ranking_order(a: &Candidate, b: &Candidate) -> Ordering {
        b.score
            .total_cmp(&a.score)
            .then(a.n_params.cmp(&b.n_params))
            .then(a.discovery.cmp(&b.discovery))
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#} (score={:.4}, lml={:.4}, k={})",
            self.expression, self.score, self.lml, self.n_params
        )
    }
}

/// Terminal status of a search
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchStatus {
    /// No expansion improved the incumbent enough or nothing is left to explore
    Converged,
    /// Generation or wall-clock budget reached
    BudgetExhausted,
}

/// Outcome of a kernel structure search
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResult {
    /// Best candidate found
    pub incumbent: Candidate,
    /// Every scored candidate in discovery order
    pub history: Vec<Candidate>,
    /// Terminal status
    pub status: SearchStatus,
    /// Number of completed expansion generations
    pub generations: u64,
    /// Number of hyperparameter fits run
    pub n_fits: usize,
    /// Number of candidates discarded because their fit failed
    pub n_pruned: usize,
    /// Incumbent score after initialization and after each generation
    pub incumbent_trace: Vec<f64>,
}

impl SearchResult {
    /// Scored candidates sorted best first
    pub fn ranking(&self) -> Vec<&Candidate> {
        let mut ranked: Vec<&Candidate> = self.history.iter().collect();
        ranked.sort_by(|a, b| Candidate::ranking_order(a, b));
        ranked
    }

    /// Best kernel expression
    pub fn expression(&self) -> &KernelExpression {
        &self.incumbent.expression
    }

    /// GP fitted with the best kernel expression, if its fit succeeded
    pub fn model(&self) -> Option<&KernelGp> {
        self.incumbent.model.as_ref()
    }
}

#[cfg(feature = "persistent")]
impl SearchResult {
    /// Save the search result in a json file
    pub fn save(&self, path: &str) -> Result<()> {
        let mut file = fs::File::create(path)?;
        let bytes = serde_json::to_vec(self)?;
        file.write_all(&bytes)?;
        Ok(())
    }

    /// Load a search result from a json file
    pub fn load(path: &str) -> Result<SearchResult> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}
