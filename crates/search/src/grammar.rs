//! Production rules generating the one-step expansions of a kernel expression.

use crate::constraints::ConstraintSet;
use autokernel_gp::kernels::BaseKernel;
use autokernel_gp::{BaseKernelKind, ChangepointKernel, KernelExpression, KernelHash, KernelSpec};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

bitflags! {
    /// Flags to specify the moves applied by the grammar at every node of an expression.
    ///
    /// ```ignore
    /// let moves = GrammarSpec::DEFAULT | GrammarSpec::CHANGEPOINT;
    /// ```
    #[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct GrammarSpec: u8 {
        /// Replace a node `N` by `N + B`
        const SUM = 0x01;
        /// Replace a node `N` by `N * B`
        const PRODUCT = 0x02;
        /// Replace a base kernel by another one
        const SUBSTITUTION = 0x04;
        /// Replace a node `N` by a changepoint between two copies of `N`
        const CHANGEPOINT = 0x08;
        /// Moves used by default
        const DEFAULT = GrammarSpec::SUM.bits()
                    | GrammarSpec::PRODUCT.bits()
                    | GrammarSpec::SUBSTITUTION.bits();
        /// All moves
        const ALL = GrammarSpec::DEFAULT.bits() | GrammarSpec::CHANGEPOINT.bits();
    }
}

impl Default for GrammarSpec {
    fn default() -> Self {
        GrammarSpec::DEFAULT
    }
}

/// Kernel grammar: a catalog of base kernels and a set of moves
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Grammar {
    catalog: KernelSpec,
    moves: GrammarSpec,
}

impl Grammar {
    /// Grammar over `catalog` base kernels applying `moves`
    pub fn new(catalog: KernelSpec, moves: GrammarSpec) -> Self {
        Grammar { catalog, moves }
    }

    /// Base kernels of the catalog
    pub fn catalog(&self) -> KernelSpec {
        self.catalog
    }

    /// Moves of the grammar
    pub fn moves(&self) -> GrammarSpec {
        self.moves
    }

    /// Every legal one-step expansion of `expr`, deduplicated by canonical hash and
    /// excluding `expr` itself.
    ///
    /// New leaves are initialized at the prior modes of `constraints` while untouched
    /// subtrees keep their current (fitted) hyperparameters.
    pub fn expand(&self, expr: &KernelExpression, constraints: &ConstraintSet) -> Vec<KernelExpression> {
        let kinds = self.catalog.kinds();
        let fresh = |kind: BaseKernelKind| BaseKernel::from_priors(kind, constraints);

        let rule = |node: &KernelExpression, parent: Option<&KernelExpression>| {
            let mut out = vec![];
            if self.moves.contains(GrammarSpec::SUM) {
                // operands of the resulting sum
                let mut operands: HashSet<KernelHash> = match parent {
                    Some(p @ KernelExpression::Sum(_)) => {
                        p.children().iter().map(|c| c.canonical_hash()).collect()
                    }
                    _ => HashSet::new(),
                };
                if let KernelExpression::Sum(_) = node {
                    operands.extend(node.children().iter().map(|c| c.canonical_hash()));
                }
                operands.insert(node.canonical_hash());
                for kind in kinds.iter() {
                    let b = KernelExpression::from(fresh(*kind));
                    if !operands.contains(&b.canonical_hash()) {
                        out.push(node.clone() + b);
                    }
                }
            }
            // white noise as a factor is zero off the diagonal and swamps the beam with
            // copies of the noise term
            let in_product = matches!(parent, Some(KernelExpression::Product(_)));
            if self.moves.contains(GrammarSpec::PRODUCT) && !has_noise_factor(node) {
                // a constant factor only rescales the amplitude
                for kind in kinds.iter().filter(|k| {
                    **k != BaseKernelKind::Constant && **k != BaseKernelKind::WhiteNoise
                }) {
                    if let Ok(b) = fresh(*kind).with_fixed_variance(1.) {
                        out.push(node.clone() * b.into());
                    }
                }
            }
            if self.moves.contains(GrammarSpec::SUBSTITUTION) {
                if let KernelExpression::Base(current) = node {
                    for kind in kinds.iter().filter(|k| {
                        **k != current.kind() && !(in_product && **k == BaseKernelKind::WhiteNoise)
                    }) {
                        let substitute = if current.has_fixed_variance() {
                            fresh(*kind).with_fixed_variance(current.params()[0].value())
                        } else {
                            Ok(fresh(*kind))
                        };
                        if let Ok(b) = substitute {
                            out.push(b.into());
                        }
                    }
                }
            }
            if self.moves.contains(GrammarSpec::CHANGEPOINT) {
                out.push(ChangepointKernel::from_priors(node.clone(), node.clone(), constraints).into());
            }
            out
        };

        let mut seen = HashSet::from([expr.canonical_hash()]);
        expr.rewrites(&rule)
            .into_iter()
            .filter(|e| seen.insert(e.canonical_hash()))
            .collect()
    }
}

fn is_noise(expr: &KernelExpression) -> bool {
    matches!(expr, KernelExpression::Base(b) if b.kind() == BaseKernelKind::WhiteNoise)
}

/// Whether multiplying `expr` by a factor makes white noise a product factor
fn has_noise_factor(expr: &KernelExpression) -> bool {
    match expr {
        KernelExpression::Product(factors) => factors.iter().any(is_noise),
        e => is_noise(e),
    }
}
