use crate::constraints::ConstraintSet;
use crate::errors::{Result, SearchError};
use autokernel_gp::{KernelGp, KernelGpParams};

use argmin::core::CostFunction;
use linfa::prelude::{Dataset, DatasetBase, Fit, Records};
use ndarray::{ArrayBase, ArrayView1, Axis, Data, Ix1, Ix2};

/// The problem handled by [`KernelSearchSolver`](crate::KernelSearchSolver): one-dimensional
/// observations and the hyperparameter constraints derived from them.
///
/// The cost of a fit parameter set is the GP fitted on the observations.
/// Observations and constraints are read-only during the search.
#[derive(Clone, Debug)]
pub struct KernelFitProblem {
    dataset: Dataset<f64, f64, Ix1>,
    constraints: ConstraintSet,
}

impl KernelFitProblem {
    /// Problem from a dataset with a single input column and finite values
    pub fn new<D: Data<Elem = f64>>(
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self> {
        let x = dataset.records();
        let y = dataset.targets();
        if x.nsamples() == 0 {
            return Err(SearchError::InvalidInputError(
                "Dataset should not be empty".to_string(),
            ));
        }
        if x.ncols() != 1 {
            return Err(SearchError::InvalidInputError(format!(
                "Expected one input column, got {}",
                x.ncols()
            )));
        }
        if y.len() != x.nrows() {
            return Err(SearchError::InvalidInputError(format!(
                "Expected {} targets, got {}",
                x.nrows(),
                y.len()
            )));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(SearchError::InvalidInputError(
                "Dataset should only contain finite values".to_string(),
            ));
        }
        let x = x.to_owned();
        let y = y.to_owned();
        let constraints = ConstraintSet::from_data(&x.column(0), &y.view());
        Ok(KernelFitProblem {
            dataset: Dataset::new(x, y),
            constraints,
        })
    }

    /// Input values
    pub fn x(&self) -> ArrayView1<f64> {
        self.dataset.records().index_axis(Axis(1), 0)
    }

    /// Observed values
    pub fn y(&self) -> ArrayView1<f64> {
        self.dataset.targets().view()
    }

    /// Number of observations
    pub fn n_points(&self) -> usize {
        self.dataset.nsamples()
    }

    /// Hyperparameter constraints derived from the observations
    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }
}

impl CostFunction for KernelFitProblem {
    type Param = KernelGpParams;
    type Output = KernelGp;

    fn cost(&self, params: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        Ok(params.fit(&self.dataset)?)
    }
}
