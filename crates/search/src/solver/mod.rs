mod fit_problem;
mod search_config;
mod search_solver;
mod search_state;

pub use fit_problem::*;
pub use search_config::*;
pub use search_solver::*;
pub use search_state::*;
