use thiserror::Error;

/// A result type for kernel search errors
pub type Result<T> = std::result::Result<T, SearchError>;

/// An error for kernel structure search
#[derive(Error, Debug)]
pub enum SearchError {
    /// When the dataset is empty or malformed
    #[error("Invalid input: {0}")]
    InvalidInputError(String),
    /// When configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfigError(String),
    /// When a kernel fit fails
    #[error("GP error")]
    GpError(#[from] autokernel_gp::GpError),
    /// When the worker pool cannot be built
    #[error(transparent)]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),
    /// When a `linfa` error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
    /// When an Argmin framework is raised
    #[error(transparent)]
    ArgminError(#[from] argmin::core::Error),
    /// When IO fails
    #[error("IO error")]
    IoError(#[from] std::io::Error),
    /// When error during saving or loading
    #[cfg(feature = "persistent")]
    #[error("Save error: {0}")]
    JsonError(#[from] serde_json::Error),
}
