use thiserror::Error;

/// A result type for kernel GP fitting
pub type Result<T> = std::result::Result<T, GpError>;

/// An error when evaluating a [`KernelExpression`](crate::KernelExpression) or fitting a [`KernelGp`](crate::KernelGp)
#[derive(Error, Debug)]
pub enum GpError {
    /// When the log marginal likelihood cannot be computed (ill-conditioned covariance, overflow)
    #[error("Likelihood computation error: {0}")]
    LikelihoodComputationError(String),
    /// When a hyperparameter lies outside its declared domain
    #[error("Domain error: {0}")]
    DomainError(String),
    /// When every optimizer restart failed for a kernel expression
    #[error("Fit error: {0}")]
    FitError(String),
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
    /// When a kernel expression cannot be saved or loaded
    #[cfg(feature = "persistent")]
    #[error("Save error: {0}")]
    SaveError(#[from] serde_json::Error),
    /// When reading or writing a kernel expression file fails
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    /// When an input has a bad value or shape
    #[error("Invalid value: {0}")]
    InvalidValueError(String),
}
