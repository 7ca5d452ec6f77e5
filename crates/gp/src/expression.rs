//! Kernel expressions: trees of base kernels composed by sums, products and changepoints.
//!
//! Expressions have value semantics: cloning gives an independent deep copy, so
//! hyperparameters are never shared between two expressions.
//!
//! Sum and product children are kept flattened (no sum directly under a sum) and sorted by
//! their structural hash, so that commutatively-equivalent trees share the same
//! [`KernelHash`] and the same parameter ordering.

use crate::errors::{GpError, Result};
use crate::kernels::{
    BaseKernel, BaseKernelKind, DefaultPriors, Hyperparameter, HyperparameterKind,
    HyperparameterPriors,
};
use crate::utils::{outer, sigmoid};
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Data, Ix1};
use sha2::{Digest, Sha256};
use std::fmt;

#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "persistent")]
use std::{fs, io::Write};

/// Structural digest of a kernel expression (SHA-256 of its canonical form)
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct KernelHash([u8; 32]);

impl KernelHash {
    fn of(form: &str) -> Self {
        KernelHash(Sha256::digest(form.as_bytes()).into())
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First eight bytes of the digest as an integer, used to derive per-structure seeds
    pub fn as_u64(&self) -> u64 {
        let mut head = [0u8; 8];
        head.copy_from_slice(&self.0[..8]);
        u64::from_le_bytes(head)
    }
}

impl fmt::Display for KernelHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..8] {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Blend of two kernels across a sigmoid boundary:
/// `k(x, x') = (1 - s(x)) (1 - s(x')) k_left(x, x') + s(x) s(x') k_right(x, x')`
/// with `s(x) = 1 / (1 + exp(-steepness (x - location)))`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct ChangepointKernel {
    location: Hyperparameter,
    steepness: Hyperparameter,
    left: KernelExpression,
    right: KernelExpression,
}

impl ChangepointKernel {
    /// Changepoint between `left` and `right` expressions
    pub fn new(
        location: Hyperparameter,
        steepness: Hyperparameter,
        left: KernelExpression,
        right: KernelExpression,
    ) -> Result<Self> {
        if location.kind() != HyperparameterKind::Location
            || steepness.kind() != HyperparameterKind::Steepness
        {
            return Err(GpError::InvalidValueError(format!(
                "Changepoint expects (location, steepness), got ({}, {})",
                location.kind().name(),
                steepness.kind().name()
            )));
        }
        Ok(ChangepointKernel {
            location,
            steepness,
            left,
            right,
        })
    }

    /// Changepoint with location and steepness taken from the given priors
    pub fn from_priors(
        left: KernelExpression,
        right: KernelExpression,
        priors: &impl HyperparameterPriors,
    ) -> Self {
        ChangepointKernel {
            location: priors.changepoint(HyperparameterKind::Location),
            steepness: priors.changepoint(HyperparameterKind::Steepness),
            left,
            right,
        }
    }

    /// Boundary location
    pub fn location(&self) -> &Hyperparameter {
        &self.location
    }

    /// Steepness of the transition
    pub fn steepness(&self) -> &Hyperparameter {
        &self.steepness
    }

    /// Expression active before the boundary
    pub fn left(&self) -> &KernelExpression {
        &self.left
    }

    /// Expression active after the boundary
    pub fn right(&self) -> &KernelExpression {
        &self.right
    }

    fn weights(&self, x: &ArrayView1<f64>) -> Array1<f64> {
        let (l, a) = (self.location.value(), self.steepness.value());
        x.mapv(|v| sigmoid(a * (v - l)))
    }
}

/// A kernel (covariance function) expression
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum KernelExpression {
    /// A base kernel
    Base(BaseKernel),
    /// Elementwise sum of the children covariances
    Sum(Vec<KernelExpression>),
    /// Elementwise product of the children covariances
    Product(Vec<KernelExpression>),
    /// Sigmoid blend of two expressions
    Changepoint(Box<ChangepointKernel>),
}

impl From<BaseKernel> for KernelExpression {
    fn from(kernel: BaseKernel) -> Self {
        KernelExpression::Base(kernel)
    }
}

impl From<ChangepointKernel> for KernelExpression {
    fn from(kernel: ChangepointKernel) -> Self {
        KernelExpression::Changepoint(Box::new(kernel))
    }
}

impl std::ops::Add for KernelExpression {
    type Output = KernelExpression;
    fn add(self, rhs: KernelExpression) -> KernelExpression {
        KernelExpression::combine(vec![self, rhs], true)
    }
}

impl std::ops::Mul for KernelExpression {
    type Output = KernelExpression;
    fn mul(self, rhs: KernelExpression) -> KernelExpression {
        KernelExpression::combine(vec![self, rhs], false)
    }
}

impl KernelExpression {
    /// Base kernel with data-agnostic default hyperparameters
    pub fn base(kind: BaseKernelKind) -> Self {
        KernelExpression::Base(BaseKernel::from_priors(kind, &DefaultPriors))
    }

    /// Sum of the given expressions (flattened and canonically ordered)
    pub fn sum(children: Vec<KernelExpression>) -> Result<Self> {
        if children.is_empty() {
            return Err(GpError::InvalidValueError(
                "Sum requires at least one child".to_string(),
            ));
        }
        Ok(Self::combine(children, true))
    }

    /// Product of the given expressions (flattened and canonically ordered)
    pub fn product(children: Vec<KernelExpression>) -> Result<Self> {
        if children.is_empty() {
            return Err(GpError::InvalidValueError(
                "Product requires at least one child".to_string(),
            ));
        }
        Ok(Self::combine(children, false))
    }

    /// Non-empty `children` combined in a sum (`is_sum`) or a product
    fn combine(children: Vec<KernelExpression>, is_sum: bool) -> Self {
        let mut flat = Vec::with_capacity(children.len());
        for child in children {
            match child {
                KernelExpression::Sum(cs) if is_sum => flat.extend(cs),
                KernelExpression::Product(cs) if !is_sum => flat.extend(cs),
                c => flat.push(c),
            }
        }
        if flat.len() == 1 {
            return flat.remove(0);
        }
        flat.sort_by_cached_key(|c| c.canonical_hash());
        if is_sum {
            KernelExpression::Sum(flat)
        } else {
            KernelExpression::Product(flat)
        }
    }

    /// Direct sub-expressions (empty for a base kernel)
    pub fn children(&self) -> Vec<&KernelExpression> {
        match self {
            KernelExpression::Base(_) => vec![],
            KernelExpression::Sum(cs) | KernelExpression::Product(cs) => cs.iter().collect(),
            KernelExpression::Changepoint(cp) => vec![&cp.left, &cp.right],
        }
    }

    /// Canonical structural form, independent of hyperparameter values and of the
    /// ordering of sum and product children
    pub fn canonical_form(&self) -> String {
        match self {
            KernelExpression::Base(b) => b.kind().symbol().to_string(),
            KernelExpression::Sum(cs) => format!("SUM({})", Self::sorted_forms(cs)),
            KernelExpression::Product(cs) => format!("PROD({})", Self::sorted_forms(cs)),
            KernelExpression::Changepoint(cp) => format!(
                "CP({},{})",
                cp.left.canonical_form(),
                cp.right.canonical_form()
            ),
        }
    }

    fn sorted_forms(children: &[KernelExpression]) -> String {
        let mut forms: Vec<(KernelHash, String)> = children
            .iter()
            .map(|c| {
                let form = c.canonical_form();
                (KernelHash::of(&form), form)
            })
            .collect();
        forms.sort();
        forms
            .into_iter()
            .map(|(_, form)| form)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Structural hash used for deduplication
    pub fn canonical_hash(&self) -> KernelHash {
        KernelHash::of(&self.canonical_form())
    }

    fn for_each_hyperparameter<'a>(&'a self, f: &mut impl FnMut(&'a Hyperparameter)) {
        match self {
            KernelExpression::Base(b) => b.params().iter().for_each(f),
            KernelExpression::Sum(cs) | KernelExpression::Product(cs) => {
                cs.iter().for_each(|c| c.for_each_hyperparameter(f))
            }
            KernelExpression::Changepoint(cp) => {
                f(&cp.location);
                f(&cp.steepness);
                cp.left.for_each_hyperparameter(f);
                cp.right.for_each_hyperparameter(f);
            }
        }
    }

    pub(crate) fn for_each_hyperparameter_mut(&mut self, f: &mut impl FnMut(&mut Hyperparameter)) {
        match self {
            KernelExpression::Base(b) => b.params_mut().iter_mut().for_each(f),
            KernelExpression::Sum(cs) | KernelExpression::Product(cs) => cs
                .iter_mut()
                .for_each(|c| c.for_each_hyperparameter_mut(f)),
            KernelExpression::Changepoint(cp) => {
                f(&mut cp.location);
                f(&mut cp.steepness);
                cp.left.for_each_hyperparameter_mut(f);
                cp.right.for_each_hyperparameter_mut(f);
            }
        }
    }

    /// All hyperparameters (free and fixed) in tree order
    pub fn hyperparameters(&self) -> Vec<&Hyperparameter> {
        let mut hps = vec![];
        self.for_each_hyperparameter(&mut |hp| hps.push(hp));
        hps
    }

    /// Number of free hyperparameters
    pub fn n_params(&self) -> usize {
        self.hyperparameters()
            .iter()
            .filter(|hp| !hp.is_fixed())
            .count()
    }

    /// Values of the free hyperparameters in tree order
    pub fn params(&self) -> Vec<f64> {
        self.free_map(|hp| hp.value())
    }

    /// Free hyperparameters in optimization coordinates
    pub fn transformed_params(&self) -> Array1<f64> {
        Array1::from(self.free_map(|hp| hp.transformed()))
    }

    /// Domains of the free hyperparameters in optimization coordinates
    pub fn transformed_bounds(&self) -> Vec<(f64, f64)> {
        self.free_map(|hp| hp.transformed_bounds())
    }

    fn free_map<T>(&self, f: impl Fn(&Hyperparameter) -> T) -> Vec<T> {
        self.hyperparameters()
            .into_iter()
            .filter(|hp| !hp.is_fixed())
            .map(f)
            .collect()
    }

    /// Sets free hyperparameters from natural values (clamped into their domains)
    pub fn set_params(&mut self, values: &[f64]) -> Result<()> {
        self.set_free(values, |hp, v| hp.set_value(v))
    }

    /// Sets free hyperparameters from optimization coordinates (clamped into their domains)
    pub fn set_transformed_params(&mut self, values: &[f64]) -> Result<()> {
        self.set_free(values, |hp, t| hp.set_transformed(t))
    }

    fn set_free(&mut self, values: &[f64], set: impl Fn(&mut Hyperparameter, f64)) -> Result<()> {
        let n = self.n_params();
        if values.len() != n {
            return Err(GpError::InvalidValueError(format!(
                "Expected {n} hyperparameter values, got {}",
                values.len()
            )));
        }
        let mut it = values.iter();
        self.for_each_hyperparameter_mut(&mut |hp| {
            if !hp.is_fixed() {
                if let Some(v) = it.next() {
                    set(hp, *v)
                }
            }
        });
        Ok(())
    }

    /// Checks every hyperparameter against its domain
    pub fn check_domain(&self) -> Result<()> {
        self.hyperparameters().iter().try_for_each(|hp| hp.check())
    }

    /// Base kernels (leaves) in tree order
    pub fn base_kernels(&self) -> Vec<&BaseKernel> {
        match self {
            KernelExpression::Base(b) => vec![b],
            _ => self
                .children()
                .into_iter()
                .flat_map(|c| c.base_kernels())
                .collect(),
        }
    }

    /// Whether a base kernel of the given kind appears in the expression
    pub fn contains(&self, kind: BaseKernelKind) -> bool {
        self.base_kernels().iter().any(|b| b.kind() == kind)
    }

    /// Whether white noise is the whole expression or a term of its top-level sum
    pub fn has_noise_summand(&self) -> bool {
        let is_noise = |e: &KernelExpression| {
            matches!(e, KernelExpression::Base(b) if b.kind() == BaseKernelKind::WhiteNoise)
        };
        match self {
            KernelExpression::Sum(children) => children.iter().any(is_noise),
            e => is_noise(e),
        }
    }

    /// Every expression obtained by replacing exactly one node of the tree (the root
    /// included) by one of the expressions `f(node, parent)` returns.
    ///
    /// Untouched subtrees are cloned with their current hyperparameter values.
    pub fn rewrites<F>(&self, f: &F) -> Vec<KernelExpression>
    where
        F: Fn(&KernelExpression, Option<&KernelExpression>) -> Vec<KernelExpression>,
    {
        self.rewrites_in(None, f)
    }

    fn rewrites_in<F>(&self, parent: Option<&KernelExpression>, f: &F) -> Vec<KernelExpression>
    where
        F: Fn(&KernelExpression, Option<&KernelExpression>) -> Vec<KernelExpression>,
    {
        let mut out = f(self, parent);
        match self {
            KernelExpression::Base(_) => (),
            KernelExpression::Sum(cs) | KernelExpression::Product(cs) => {
                let is_sum = matches!(self, KernelExpression::Sum(_));
                for (i, child) in cs.iter().enumerate() {
                    for replacement in child.rewrites_in(Some(self), f) {
                        let mut children = cs.clone();
                        children[i] = replacement;
                        out.push(Self::combine(children, is_sum));
                    }
                }
            }
            KernelExpression::Changepoint(cp) => {
                for replacement in cp.left.rewrites_in(Some(self), f) {
                    let mut new = (**cp).clone();
                    new.left = replacement;
                    out.push(new.into());
                }
                for replacement in cp.right.rewrites_in(Some(self), f) {
                    let mut new = (**cp).clone();
                    new.right = replacement;
                    out.push(new.into());
                }
            }
        }
        out
    }

    /// Covariance matrix between observations at `x1` and distinct observations at `x2`.
    ///
    /// White noise terms contribute nothing, even where inputs coincide: use
    /// [`KernelExpression::gram`] for the covariance of a set of observations with itself.
    /// Fails with [`GpError::DomainError`] when a hyperparameter lies outside its domain.
    pub fn value(
        &self,
        x1: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        x2: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<Array2<f64>> {
        self.check_domain()?;
        Ok(self.eval(&x1.view(), Some(&x2.view())))
    }

    /// Covariance matrix of the observations at `x` with themselves, white noise terms
    /// on the diagonal (repeated inputs are distinct observations).
    ///
    /// Fails with [`GpError::DomainError`] when a hyperparameter lies outside its domain.
    pub fn gram(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> Result<Array2<f64>> {
        self.check_domain()?;
        Ok(self.eval(&x.view(), None))
    }

    /// Covariance matrix of the observations at `x` (see [`KernelExpression::gram`]) and
    /// its derivatives with respect to the free hyperparameters in optimization
    /// coordinates (tree order)
    pub fn value_and_gradients(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<(Array2<f64>, Vec<Array2<f64>>)> {
        self.check_domain()?;
        Ok(self.eval_grad(&x.view()))
    }

    /// Cross-covariance with `x2`, or gram matrix of `x1` when `x2` is `None`
    fn eval(&self, x1: &ArrayView1<f64>, x2: Option<&ArrayView1<f64>>) -> Array2<f64> {
        let dim = (x1.len(), x2.map_or(x1.len(), |x2| x2.len()));
        match self {
            KernelExpression::Base(b) => match x2 {
                Some(x2) => b.value(x1, x2),
                None => b.gram(x1),
            },
            KernelExpression::Sum(cs) => cs
                .iter()
                .fold(Array2::<f64>::zeros(dim), |acc, c| acc + c.eval(x1, x2)),
            KernelExpression::Product(cs) => cs
                .iter()
                .fold(Array2::<f64>::ones(dim), |acc, c| acc * c.eval(x1, x2)),
            KernelExpression::Changepoint(cp) => {
                let s1 = cp.weights(x1);
                let s2 = match x2 {
                    Some(x2) => cp.weights(x2),
                    None => cp.weights(x1),
                };
                let u1 = s1.mapv(|v| 1. - v);
                let u2 = s2.mapv(|v| 1. - v);
                outer(&u1, &u2) * cp.left.eval(x1, x2) + outer(&s1, &s2) * cp.right.eval(x1, x2)
            }
        }
    }

    fn eval_grad(&self, x: &ArrayView1<f64>) -> (Array2<f64>, Vec<Array2<f64>>) {
        let dim = (x.len(), x.len());
        match self {
            KernelExpression::Base(b) => b.value_and_gradients(x),
            KernelExpression::Sum(cs) => {
                let mut k = Array2::<f64>::zeros(dim);
                let mut grads = vec![];
                for c in cs {
                    let (kc, gc) = c.eval_grad(x);
                    k = k + kc;
                    grads.extend(gc);
                }
                (k, grads)
            }
            KernelExpression::Product(cs) => {
                let parts: Vec<_> = cs.iter().map(|c| c.eval_grad(x)).collect();
                let k = parts.iter().fold(Array2::<f64>::ones(dim), |acc, (kc, _)| acc * kc);
                let mut grads = vec![];
                for (i, (_, gi)) in parts.iter().enumerate() {
                    let others = parts
                        .iter()
                        .enumerate()
                        .filter(|(j, _)| *j != i)
                        .fold(Array2::<f64>::ones(dim), |acc, (_, (kj, _))| acc * kj);
                    grads.extend(gi.iter().map(|g| g * &others));
                }
                (k, grads)
            }
            KernelExpression::Changepoint(cp) => {
                let s = cp.weights(x);
                let u = s.mapv(|v| 1. - v);
                let (kl, gl) = cp.left.eval_grad(x);
                let (kr, gr) = cp.right.eval_grad(x);
                let wl = outer(&u, &u);
                let wr = outer(&s, &s);
                let k = &wl * &kl + &wr * &kr;

                let (l, a) = (cp.location.value(), cp.steepness.value());
                let slope = s.mapv(|v| v * (1. - v));
                let blend = |ds: Array1<f64>| {
                    let du = ds.mapv(|v| -v);
                    (outer(&du, &u) + outer(&u, &du)) * &kl + (outer(&ds, &s) + outer(&s, &ds)) * &kr
                };
                let mut grads = vec![];
                if !cp.location.is_fixed() {
                    grads.push(blend(slope.mapv(|v| -a * v)));
                }
                if !cp.steepness.is_fixed() {
                    // log coordinates: a * ds/da
                    let ds = ndarray::Zip::from(&slope)
                        .and(x)
                        .map_collect(|&sl, &xv| a * (xv - l) * sl);
                    grads.push(blend(ds));
                }
                grads.extend(gl.iter().map(|g| g * &wl));
                grads.extend(gr.iter().map(|g| g * &wr));
                (k, grads)
            }
        }
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, in_product: bool) -> fmt::Result {
        match self {
            KernelExpression::Base(b) => {
                if f.alternate() {
                    write!(f, "{b:#}")
                } else {
                    write!(f, "{b}")
                }
            }
            KernelExpression::Sum(cs) => {
                if in_product {
                    write!(f, "(")?;
                }
                for (i, c) in cs.iter().enumerate() {
                    if i > 0 {
                        write!(f, " + ")?;
                    }
                    c.fmt_node(f, false)?;
                }
                if in_product {
                    write!(f, ")")?;
                }
                Ok(())
            }
            KernelExpression::Product(cs) => {
                for (i, c) in cs.iter().enumerate() {
                    if i > 0 {
                        write!(f, " * ")?;
                    }
                    c.fmt_node(f, true)?;
                }
                Ok(())
            }
            KernelExpression::Changepoint(cp) => {
                write!(f, "CP(")?;
                if f.alternate() {
                    write!(
                        f,
                        "location={:.4}, steepness={:.4}; ",
                        cp.location.value(),
                        cp.steepness.value()
                    )?;
                }
                cp.left.fmt_node(f, false)?;
                write!(f, ", ")?;
                cp.right.fmt_node(f, false)?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for KernelExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_node(f, false)
    }
}

#[cfg(feature = "persistent")]
impl KernelExpression {
    /// Save the expression with its hyperparameters in a json file
    pub fn save(&self, path: &str) -> Result<()> {
        let mut file = fs::File::create(path)?;
        let bytes = serde_json::to_vec(self)?;
        file.write_all(&bytes)?;
        Ok(())
    }

    /// Load an expression from a json file
    pub fn load(path: &str) -> Result<KernelExpression> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }
}
