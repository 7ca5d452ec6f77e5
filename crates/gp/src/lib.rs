//! This library implements compositional covariance kernels for one-dimensional
//! [Gaussian Process](https://en.wikipedia.org/wiki/Gaussian_process) regression
//! and the fitting of their hyperparameters by maximum likelihood.
//!
//! Kernels are trees ([KernelExpression]) built from base kernels (constant, white
//! noise, squared exponential, periodic, linear, rational quadratic, matern 5/2)
//! combined with sums, products and changepoints. Each expression has a canonical
//! structural hash invariant to the order of sum and product operands.
//!
//! Hyperparameters are fitted with [KernelGp] parameterized by [KernelGpParams]:
//! the log marginal likelihood (see [LikelihoodEvaluator]) is maximized from several
//! starting points with a bounded [Maximizer].
//!
//! # Features
//!
//! ## serializable
//!
//! The `serializable` feature enables the serialization of kernel expressions and
//! fitted models using the [`serde crate`](https://serde.rs/).
//!
//! ## persistent
//!
//! The `persistent` feature enables `save()`/`load()` of kernel expressions in json format.
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
mod errors;
mod expression;
pub mod kernels;
mod likelihood;
mod optimization;
mod parameters;
mod utils;

pub use algorithm::*;
pub use errors::*;
pub use expression::*;
pub use kernels::{BaseKernel, BaseKernelKind, HyperparameterKind, HyperparameterPriors, KernelSpec};
pub use likelihood::*;
pub use optimization::{
    CobylaMaximizer, ConvergenceStatus, Maximizer, MaximizerKind, MaximizerOutcome, Objective,
    SlsqpMaximizer,
};
pub use parameters::*;
pub use utils::pairwise_differences;
