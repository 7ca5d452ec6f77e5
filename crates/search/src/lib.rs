//! This library implements the automatic discovery of a gaussian process kernel
//! explaining one-dimensional observations `(x, y)`, in the spirit of the
//! [Automatic Statistician](https://arxiv.org/abs/1302.4922) structure search.
//!
//! Kernel expressions are built from base kernels (constant, white noise, squared
//! exponential, periodic, linear, rational quadratic and optionally matern 5/2)
//! combined by sums, products and changepoints. The search is a greedy beam search:
//!
//! * every base kernel of the catalog is fitted,
//! * the best `beam_width` expressions form the frontier,
//! * each generation expands the frontier with the grammar moves (see [GrammarSpec]),
//!   fits the hyperparameters of the new expressions in parallel, starting from the
//!   fitted values of their parent, and keeps the best `beam_width` expressions,
//! * the search stops when the best score improves by no more than `score_tolerance`,
//!   when nothing is left to expand or when the generation or time budget is spent.
//!
//! Expressions are ranked by a penalized log marginal likelihood (BIC by default, see
//! [ScoreKind]). Hyperparameter domains and initial values are derived from the data
//! statistics (see [ConstraintSet]) so that, for instance, periods stay between twice
//! the smallest input spacing and the input span.
//!
//! # Example
//!
//! ```no_run
//! use autokernel_search::{search_xy, BaseKernelKind, SearchConfig};
//! use ndarray::Array1;
//!
//! let x = Array1::linspace(0., 10., 100);
//! let y = x.mapv(|v| (2. * std::f64::consts::PI * v).sin());
//!
//! let res = search_xy(&x, &y, SearchConfig::default().beam_width(2).max_generations(2))
//!     .expect("kernel search");
//! println!("Best kernel: {}", res.incumbent);
//! assert!(res.expression().contains(BaseKernelKind::Periodic));
//! ```
//!
//! The search itself is an [argmin](https://www.argmin-rs.org/) solver
//! ([KernelSearchSolver]) which can be driven directly with an `argmin::core::Executor`.
//!
//! # Logging
//!
//! Logs are emitted with the `log` crate and printed on stdout by `env_logger`,
//! the level is controlled by the `AUTOKERNEL_LOG` environment variable (default `info`).
//!
//! # Features
//!
//! ## persistent
//!
//! The `persistent` feature enables `save()`/`load()` of [SearchResult] in json format.
//!
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]

mod constraints;
mod errors;
mod grammar;
mod scorer;
mod search;
mod solver;
mod types;

pub use crate::constraints::*;
pub use crate::errors::*;
pub use crate::grammar::*;
pub use crate::scorer::*;
pub use crate::search::*;
pub use crate::solver::*;
pub use crate::types::*;

pub use autokernel_gp::{BaseKernelKind, KernelExpression, KernelSpec, MaximizerKind};
