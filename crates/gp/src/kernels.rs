//! Base kernels (covariance functions) over a one-dimensional input space.
//!
//! A base kernel is a [`BaseKernelKind`] paired with its [`Hyperparameter`]s, each of them
//! carrying a domain `[lower, upper]` and a transform used by optimizers
//! (log for positive quantities, identity for locations on the real line).
//!
//! Gradients are always expressed with respect to the *transformed* hyperparameters,
//! that is `dK/dlog(theta)` for log-transformed ones.

use crate::errors::{GpError, Result};
use crate::utils::pairwise_differences;
use bitflags::bitflags;
use ndarray::{Array2, ArrayBase, Data, Ix1, Zip};
use std::f64::consts::PI;
use std::fmt;

#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// Relative slack accepted when checking a value against its domain
const DOMAIN_TOL: f64 = 1e-9;

bitflags! {
    /// Flags to specify the catalog of base kernels used to build kernel expressions.
    ///
    /// Flags can be combine with bit-wise `or` operator to select two or more kernels.
    /// ```ignore
    /// let spec = KernelSpec::SQUAREDEXPONENTIAL | KernelSpec::PERIODIC;
    /// ```
    ///
    /// See [bitflags::bitflags]
    #[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy)]
    #[cfg_attr(feature = "serializable", derive(Serialize, Deserialize), serde(transparent))]
    pub struct KernelSpec: u8 {
        /// Constant kernel
        const CONSTANT = 0x01;
        /// White noise kernel
        const WHITENOISE = 0x02;
        /// Squared exponential kernel
        const SQUAREDEXPONENTIAL = 0x04;
        /// Periodic kernel
        const PERIODIC = 0x08;
        /// Linear kernel
        const LINEAR = 0x10;
        /// Rational quadratic kernel
        const RATIONALQUADRATIC = 0x20;
        /// Matern 5/2 kernel
        const MATERN52 = 0x40;
        /// Kernels used by default {CONST, WN, SE, PER, LIN, RQ}
        const DEFAULT = KernelSpec::CONSTANT.bits()
                    | KernelSpec::WHITENOISE.bits()
                    | KernelSpec::SQUAREDEXPONENTIAL.bits()
                    | KernelSpec::PERIODIC.bits()
                    | KernelSpec::LINEAR.bits()
                    | KernelSpec::RATIONALQUADRATIC.bits();
        /// All kernels available
        const ALL = KernelSpec::DEFAULT.bits() | KernelSpec::MATERN52.bits();
    }
}

impl Default for KernelSpec {
    fn default() -> Self {
        KernelSpec::DEFAULT
    }
}

impl KernelSpec {
    /// Base kernel kinds selected by these flags, in catalog order
    pub fn kinds(&self) -> Vec<BaseKernelKind> {
        BaseKernelKind::ALL
            .iter()
            .copied()
            .filter(|kind| self.contains(kind.spec()))
            .collect()
    }
}

/// Kind of a base kernel
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum BaseKernelKind {
    /// `k(x, x') = variance`
    Constant,
    /// `variance` on the diagonal of the covariance of a set of observations, 0 between
    /// distinct observations even at equal inputs
    WhiteNoise,
    /// `k(x, x') = variance * exp(-r^2 / (2 l^2))`
    SquaredExponential,
    /// `k(x, x') = variance * exp(-2 sin^2(pi r / p) / l^2)`
    Periodic,
    /// `k(x, x') = variance * (x - c) (x' - c)`
    Linear,
    /// `k(x, x') = variance * (1 + r^2 / (2 alpha l^2))^-alpha`
    RationalQuadratic,
    /// `k(x, x') = variance * (1 + sqrt(5) r / l + 5 r^2 / (3 l^2)) exp(-sqrt(5) r / l)`
    Matern52,
}

impl BaseKernelKind {
    /// Every base kernel kind, in catalog order
    pub const ALL: [BaseKernelKind; 7] = [
        BaseKernelKind::Constant,
        BaseKernelKind::WhiteNoise,
        BaseKernelKind::SquaredExponential,
        BaseKernelKind::Periodic,
        BaseKernelKind::Linear,
        BaseKernelKind::RationalQuadratic,
        BaseKernelKind::Matern52,
    ];

    /// Symbol used when rendering kernel expressions
    pub fn symbol(&self) -> &'static str {
        match self {
            BaseKernelKind::Constant => "CONST",
            BaseKernelKind::WhiteNoise => "WN",
            BaseKernelKind::SquaredExponential => "SE",
            BaseKernelKind::Periodic => "PER",
            BaseKernelKind::Linear => "LIN",
            BaseKernelKind::RationalQuadratic => "RQ",
            BaseKernelKind::Matern52 => "M52",
        }
    }

    /// Corresponding catalog flag
    pub fn spec(&self) -> KernelSpec {
        match self {
            BaseKernelKind::Constant => KernelSpec::CONSTANT,
            BaseKernelKind::WhiteNoise => KernelSpec::WHITENOISE,
            BaseKernelKind::SquaredExponential => KernelSpec::SQUAREDEXPONENTIAL,
            BaseKernelKind::Periodic => KernelSpec::PERIODIC,
            BaseKernelKind::Linear => KernelSpec::LINEAR,
            BaseKernelKind::RationalQuadratic => KernelSpec::RATIONALQUADRATIC,
            BaseKernelKind::Matern52 => KernelSpec::MATERN52,
        }
    }

    /// Hyperparameters of the kernel, in storage order. Variance always comes first.
    pub fn hyperparameter_kinds(&self) -> &'static [HyperparameterKind] {
        use HyperparameterKind::*;
        match self {
            BaseKernelKind::Constant | BaseKernelKind::WhiteNoise => &[Variance],
            BaseKernelKind::SquaredExponential | BaseKernelKind::Matern52 => {
                &[Variance, Lengthscale]
            }
            BaseKernelKind::Periodic => &[Variance, Lengthscale, Period],
            BaseKernelKind::Linear => &[Variance, Location],
            BaseKernelKind::RationalQuadratic => &[Variance, Lengthscale, Alpha],
        }
    }
}

impl fmt::Display for BaseKernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl TryFrom<&str> for BaseKernelKind {
    type Error = GpError;
    fn try_from(s: &str) -> Result<Self> {
        match s {
            "CONST" => Ok(BaseKernelKind::Constant),
            "WN" => Ok(BaseKernelKind::WhiteNoise),
            "SE" | "RBF" => Ok(BaseKernelKind::SquaredExponential),
            "PER" => Ok(BaseKernelKind::Periodic),
            "LIN" => Ok(BaseKernelKind::Linear),
            "RQ" => Ok(BaseKernelKind::RationalQuadratic),
            "M52" => Ok(BaseKernelKind::Matern52),
            _ => Err(GpError::InvalidValueError(format!(
                "Bad string value for base kernel, got {s}"
            ))),
        }
    }
}

/// Name of a hyperparameter
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum HyperparameterKind {
    /// Amplitude (signal or noise variance)
    Variance,
    /// Characteristic length-scale
    Lengthscale,
    /// Period of a periodic kernel
    Period,
    /// Scale mixture parameter of the rational quadratic kernel
    Alpha,
    /// Offset of the linear kernel or changepoint location
    Location,
    /// Steepness of a changepoint sigmoid
    Steepness,
}

impl HyperparameterKind {
    /// Short name used when rendering
    pub fn name(&self) -> &'static str {
        match self {
            HyperparameterKind::Variance => "variance",
            HyperparameterKind::Lengthscale => "lengthscale",
            HyperparameterKind::Period => "period",
            HyperparameterKind::Alpha => "alpha",
            HyperparameterKind::Location => "location",
            HyperparameterKind::Steepness => "steepness",
        }
    }

    /// Transform used by optimizers for this kind of hyperparameter
    pub fn transform(&self) -> Transform {
        match self {
            HyperparameterKind::Location => Transform::Identity,
            _ => Transform::Log,
        }
    }
}

/// Coordinate change between natural and optimization spaces
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum Transform {
    /// Strictly positive value optimized as `ln(value)`
    Log,
    /// Real value optimized as is
    Identity,
}

impl Transform {
    fn forward(&self, v: f64) -> f64 {
        match self {
            Transform::Log => v.ln(),
            Transform::Identity => v,
        }
    }

    fn backward(&self, t: f64) -> f64 {
        match self {
            Transform::Log => t.exp(),
            Transform::Identity => t,
        }
    }
}

/// A continuous hyperparameter with its domain.
///
/// The value always lies within `[lower, upper]`: setters clamp round-off excursions.
/// A fixed hyperparameter is neither optimized nor counted as a free parameter.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct Hyperparameter {
    kind: HyperparameterKind,
    value: f64,
    lower: f64,
    upper: f64,
    fixed: bool,
}

impl Hyperparameter {
    /// Free hyperparameter with initial `value` within `(lower, upper)` bounds.
    ///
    /// Bounds are reordered if needed and the value is clamped into them.
    /// Log-transformed hyperparameters require a strictly positive lower bound.
    pub fn new(kind: HyperparameterKind, value: f64, bounds: (f64, f64)) -> Result<Self> {
        let (lower, upper) = if bounds.0 <= bounds.1 {
            bounds
        } else {
            (bounds.1, bounds.0)
        };
        if !(lower.is_finite() && upper.is_finite() && value.is_finite()) {
            return Err(GpError::InvalidValueError(format!(
                "{} should be finite, got {value} in [{lower}, {upper}]",
                kind.name()
            )));
        }
        if kind.transform() == Transform::Log && lower <= 0. {
            return Err(GpError::InvalidValueError(format!(
                "{} lower bound should be strictly positive, got {lower}",
                kind.name()
            )));
        }
        Ok(Hyperparameter {
            kind,
            value: value.clamp(lower, upper),
            lower,
            upper,
            fixed: false,
        })
    }

    /// Hyperparameter frozen at `value`
    pub fn fixed(kind: HyperparameterKind, value: f64) -> Result<Self> {
        let mut hp = Self::new(kind, value, (value, value))?;
        hp.fixed = true;
        Ok(hp)
    }

    /// Name of the hyperparameter
    pub fn kind(&self) -> HyperparameterKind {
        self.kind
    }

    /// Current value
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Domain `(lower, upper)`
    pub fn bounds(&self) -> (f64, f64) {
        (self.lower, self.upper)
    }

    /// Whether the hyperparameter is frozen
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Transform used for optimization
    pub fn transform(&self) -> Transform {
        self.kind.transform()
    }

    /// Sets the value, clamped into the domain
    pub fn set_value(&mut self, value: f64) {
        if !self.fixed {
            self.value = value.clamp(self.lower, self.upper);
        }
    }

    /// Value in optimization coordinates
    pub fn transformed(&self) -> f64 {
        self.transform().forward(self.value)
    }

    /// Sets the value from optimization coordinates, clamped into the domain
    pub fn set_transformed(&mut self, t: f64) {
        self.set_value(self.transform().backward(t))
    }

    /// Domain in optimization coordinates
    pub fn transformed_bounds(&self) -> (f64, f64) {
        let tr = self.transform();
        (tr.forward(self.lower), tr.forward(self.upper))
    }

    #[cfg(test)]
    pub(crate) fn set_unchecked(&mut self, value: f64) {
        self.value = value;
    }

    /// Checks the value against its domain
    pub fn check(&self) -> Result<()> {
        let slack = DOMAIN_TOL * (1. + self.lower.abs().max(self.upper.abs()));
        if !self.value.is_finite()
            || self.value < self.lower - slack
            || self.value > self.upper + slack
        {
            return Err(GpError::DomainError(format!(
                "{} = {} outside [{}, {}]",
                self.kind.name(),
                self.value,
                self.lower,
                self.upper
            )));
        }
        Ok(())
    }
}

/// Source of domains and initial values for freshly created hyperparameters
pub trait HyperparameterPriors {
    /// Hyperparameter `hp` of a base kernel of type `kind`
    fn base(&self, kind: BaseKernelKind, hp: HyperparameterKind) -> Hyperparameter;
    /// Hyperparameter `hp` (location or steepness) of a changepoint
    fn changepoint(&self, hp: HyperparameterKind) -> Hyperparameter;
}

/// Wide data-agnostic domains, used when no dataset statistics are available
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultPriors;

impl DefaultPriors {
    /// Default initial value
    pub const DEFAULT_INIT: f64 = 1.;
    /// Default bounds for positive hyperparameters
    pub const DEFAULT_BOUNDS: (f64, f64) = (1e-6, 1e6);
    /// Default bounds for location hyperparameters
    pub const DEFAULT_LOCATION_BOUNDS: (f64, f64) = (-1e3, 1e3);

    fn make(kind: HyperparameterKind, value: f64, bounds: (f64, f64)) -> Hyperparameter {
        // constants above are valid domains
        Hyperparameter {
            kind,
            value: value.clamp(bounds.0, bounds.1),
            lower: bounds.0,
            upper: bounds.1,
            fixed: false,
        }
    }
}

impl HyperparameterPriors for DefaultPriors {
    fn base(&self, kind: BaseKernelKind, hp: HyperparameterKind) -> Hyperparameter {
        match (kind, hp) {
            (_, HyperparameterKind::Location) => {
                Self::make(hp, 0., Self::DEFAULT_LOCATION_BOUNDS)
            }
            (BaseKernelKind::Periodic, HyperparameterKind::Lengthscale) => {
                Self::make(hp, Self::DEFAULT_INIT, (1e-1, 1e1))
            }
            (BaseKernelKind::RationalQuadratic, HyperparameterKind::Alpha) => {
                Self::make(hp, Self::DEFAULT_INIT, (1e-2, 1e2))
            }
            _ => Self::make(hp, Self::DEFAULT_INIT, Self::DEFAULT_BOUNDS),
        }
    }

    fn changepoint(&self, hp: HyperparameterKind) -> Hyperparameter {
        match hp {
            HyperparameterKind::Location => Self::make(hp, 0., Self::DEFAULT_LOCATION_BOUNDS),
            _ => Self::make(hp, Self::DEFAULT_INIT, (1e-3, 1e3)),
        }
    }
}

/// A leaf of a kernel expression
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct BaseKernel {
    kind: BaseKernelKind,
    params: Vec<Hyperparameter>,
}

impl BaseKernel {
    /// Base kernel with hyperparameters given in [`BaseKernelKind::hyperparameter_kinds`] order
    pub fn new(kind: BaseKernelKind, params: Vec<Hyperparameter>) -> Result<Self> {
        let expected = kind.hyperparameter_kinds();
        if params.len() != expected.len()
            || params.iter().zip(expected).any(|(p, k)| p.kind() != *k)
        {
            return Err(GpError::InvalidValueError(format!(
                "{kind} expects hyperparameters {:?}, got {:?}",
                expected,
                params.iter().map(|p| p.kind()).collect::<Vec<_>>()
            )));
        }
        Ok(BaseKernel { kind, params })
    }

    /// Base kernel initialized from the given priors
    pub fn from_priors(kind: BaseKernelKind, priors: &impl HyperparameterPriors) -> Self {
        let params = kind
            .hyperparameter_kinds()
            .iter()
            .map(|hp| priors.base(kind, *hp))
            .collect();
        BaseKernel { kind, params }
    }

    /// Kind of the kernel
    pub fn kind(&self) -> BaseKernelKind {
        self.kind
    }

    /// Hyperparameters, in storage order
    pub fn params(&self) -> &[Hyperparameter] {
        &self.params
    }

    pub(crate) fn params_mut(&mut self) -> &mut [Hyperparameter] {
        &mut self.params
    }

    /// Value of the hyperparameter `hp` if the kernel has one
    pub fn param(&self, hp: HyperparameterKind) -> Option<f64> {
        self.params.iter().find(|p| p.kind() == hp).map(|p| p.value())
    }

    /// Freezes the variance of the kernel at `value`
    pub fn with_fixed_variance(mut self, value: f64) -> Result<Self> {
        self.params[0] = Hyperparameter::fixed(HyperparameterKind::Variance, value)?;
        Ok(self)
    }

    /// Whether the variance is frozen
    pub fn has_fixed_variance(&self) -> bool {
        self.params[0].is_fixed()
    }

    fn p(&self, i: usize) -> f64 {
        self.params[i].value()
    }

    /// Covariance matrix between observations at `x1` (n1 points) and distinct
    /// observations at `x2` (n2 points)
    pub(crate) fn value(
        &self,
        x1: &ArrayBase<impl Data<Elem = f64>, Ix1>,
        x2: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Array2<f64> {
        let var = self.p(0);
        match self.kind {
            BaseKernelKind::Constant => Array2::from_elem((x1.len(), x2.len()), var),
            BaseKernelKind::WhiteNoise => Array2::zeros((x1.len(), x2.len())),
            BaseKernelKind::Linear => {
                let c = self.p(1);
                let mut k = Array2::zeros((x1.len(), x2.len()));
                Zip::indexed(&mut k).for_each(|(i, j), v| *v = var * (x1[i] - c) * (x2[j] - c));
                k
            }
            _ => self.stationary(&pairwise_differences(x1, x2)).0,
        }
    }

    /// Covariance matrix of the observations at `x` with themselves
    pub(crate) fn gram(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix1>) -> Array2<f64> {
        match self.kind {
            BaseKernelKind::WhiteNoise => Array2::from_diag_elem(x.len(), self.p(0)),
            _ => self.value(x, x),
        }
    }

    /// Covariance matrix of the observations at `x` and its derivatives with respect to
    /// each free transformed hyperparameter, in storage order
    pub(crate) fn value_and_gradients(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> (Array2<f64>, Vec<Array2<f64>>) {
        let (k, grads) = match self.kind {
            BaseKernelKind::Constant | BaseKernelKind::WhiteNoise => {
                let k = self.gram(x);
                (k.clone(), vec![k])
            }
            BaseKernelKind::Linear => {
                let (var, c) = (self.p(0), self.p(1));
                let k = self.value(x, x);
                let mut dc = Array2::zeros(k.dim());
                Zip::indexed(&mut dc)
                    .for_each(|(i, j), v| *v = -var * ((x[i] - c) + (x[j] - c)));
                (k.clone(), vec![k, dc])
            }
            _ => self.stationary(&pairwise_differences(x, x)),
        };
        let grads = grads
            .into_iter()
            .zip(&self.params)
            .filter(|(_, p)| !p.is_fixed())
            .map(|(g, _)| g)
            .collect();
        (k, grads)
    }

    /// Stationary kernels as functions of the signed differences `d`,
    /// gradients returned for all hyperparameters (log coordinates)
    fn stationary(&self, d: &Array2<f64>) -> (Array2<f64>, Vec<Array2<f64>>) {
        let var = self.p(0);
        match self.kind {
            BaseKernelKind::SquaredExponential => {
                let l = self.p(1);
                let r2 = d.mapv(|v| v * v / (l * l));
                let k = r2.mapv(|v| var * (-0.5 * v).exp());
                let dl = &k * &r2;
                (k.clone(), vec![k, dl])
            }
            BaseKernelKind::Periodic => {
                let (l, p) = (self.p(1), self.p(2));
                let l2 = l * l;
                let k = d.mapv(|v| {
                    let s = (PI * v / p).sin();
                    var * (-2. * s * s / l2).exp()
                });
                let dl = Zip::from(&k)
                    .and(d)
                    .map_collect(|&kv, &v| {
                        let s = (PI * v / p).sin();
                        kv * 4. * s * s / l2
                    });
                let dp = Zip::from(&k)
                    .and(d)
                    .map_collect(|&kv, &v| kv * 2. * PI * v * (2. * PI * v / p).sin() / (l2 * p));
                (k.clone(), vec![k, dl, dp])
            }
            BaseKernelKind::RationalQuadratic => {
                let (l, alpha) = (self.p(1), self.p(2));
                let r2 = d.mapv(|v| v * v / (l * l));
                let q = r2.mapv(|v| 1. + v / (2. * alpha));
                let k = q.mapv(|v| var * v.powf(-alpha));
                let dl = Zip::from(&k)
                    .and(&r2)
                    .and(&q)
                    .map_collect(|&kv, &r, &qv| kv * r / qv);
                let da = Zip::from(&k)
                    .and(&r2)
                    .and(&q)
                    .map_collect(|&kv, &r, &qv| kv * (-alpha * qv.ln() + 0.5 * r / qv));
                (k.clone(), vec![k, dl, da])
            }
            BaseKernelKind::Matern52 => {
                let l = self.p(1);
                let a = d.mapv(|v| 5f64.sqrt() * v.abs() / l);
                let k = a.mapv(|v| var * (1. + v + v * v / 3.) * (-v).exp());
                let dl = a.mapv(|v| var * v * v * (1. + v) / 3. * (-v).exp());
                (k.clone(), vec![k, dl])
            }
            // non-stationary kernels are handled by the callers
            BaseKernelKind::Constant | BaseKernelKind::WhiteNoise | BaseKernelKind::Linear => {
                let k = Array2::from_elem(d.dim(), var);
                (k.clone(), vec![k])
            }
        }
    }

    /// Checks every hyperparameter against its domain
    pub fn check_domain(&self) -> Result<()> {
        self.params.iter().try_for_each(|p| p.check())
    }
}

impl fmt::Display for BaseKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            let params = self
                .params
                .iter()
                .map(|p| format!("{}={:.4}", p.kind().name(), p.value()))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, "{}({})", self.kind, params)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use finitediff::FiniteDiff;
    use ndarray::{array, Array1};
    use paste::paste;

    fn set_transformed(kernel: &BaseKernel, t: &[f64]) -> BaseKernel {
        let mut k = kernel.clone();
        k.params_mut()
            .iter_mut()
            .filter(|p| !p.is_fixed())
            .zip(t)
            .for_each(|(p, v)| p.set_transformed(*v));
        k
    }

    macro_rules! test_kernel_gradients {
        ($kind:ident, $($value:expr),+) => {
            paste! {
                #[test]
                fn [<test_ $kind:snake _gradients>]() {
                    let x = array![0.1, 0.35, 0.7, 1.3, 2.05];
                    let params = BaseKernelKind::$kind
                        .hyperparameter_kinds()
                        .iter()
                        .zip([$($value),+])
                        .map(|(hp, v)| Hyperparameter::new(*hp, v, test_bounds(*hp)).unwrap())
                        .collect();
                    let kernel = BaseKernel::new(BaseKernelKind::$kind, params).unwrap();
                    let (k, grads) = kernel.value_and_gradients(&x);
                    assert_abs_diff_eq!(k, kernel.gram(&x), epsilon = 1e-12);

                    let t0: Vec<f64> = kernel.params().iter().map(|p| p.transformed()).collect();
                    for (idx, grad) in grads.iter().enumerate() {
                        for (i, j) in [(0, 1), (1, 3), (2, 2), (4, 0)] {
                            let f = |t: &Vec<f64>| set_transformed(&kernel, t).gram(&x)[[i, j]];
                            let fd = t0.central_diff(&f);
                            assert_abs_diff_eq!(grad[[i, j]], fd[idx], epsilon = 1e-6);
                        }
                    }
                }
            }
        };
    }

    fn test_bounds(hp: HyperparameterKind) -> (f64, f64) {
        match hp.transform() {
            Transform::Identity => (-10., 10.),
            Transform::Log => (1e-6, 1e6),
        }
    }

    test_kernel_gradients!(SquaredExponential, 1.7, 0.6);
    test_kernel_gradients!(Periodic, 0.9, 0.8, 0.45);
    test_kernel_gradients!(RationalQuadratic, 1.2, 0.5, 2.5);
    test_kernel_gradients!(Matern52, 2.0, 0.7);
    test_kernel_gradients!(Linear, 0.4, 0.3);
    test_kernel_gradients!(Constant, 3.0);
    test_kernel_gradients!(WhiteNoise, 0.2);

    #[test]
    fn test_white_noise_is_diagonal_on_same_inputs() {
        let kernel = BaseKernel::from_priors(BaseKernelKind::WhiteNoise, &DefaultPriors);
        let x = array![0., 1., 2.];
        assert_abs_diff_eq!(kernel.gram(&x), Array2::eye(3), epsilon = 1e-15);
        let cross = kernel.value(&x, &array![0.5, 1.]);
        assert_abs_diff_eq!(cross, Array2::zeros((3, 2)), epsilon = 1e-15);
    }

    #[test]
    fn test_white_noise_with_repeated_inputs() {
        let kernel = BaseKernel::from_priors(BaseKernelKind::WhiteNoise, &DefaultPriors);
        let x = array![0.5, 0.5, 1., 1., 1.];
        let (k, grads) = kernel.value_and_gradients(&x);
        assert_abs_diff_eq!(k, Array2::eye(5), epsilon = 1e-15);
        assert_abs_diff_eq!(grads[0], Array2::eye(5), epsilon = 1e-15);
        assert_abs_diff_eq!(kernel.value(&x, &x), Array2::zeros((5, 5)), epsilon = 1e-15);
    }

    #[test]
    fn test_periodic_repeats_with_period() {
        let params = vec![
            Hyperparameter::new(HyperparameterKind::Variance, 1., (1e-3, 1e3)).unwrap(),
            Hyperparameter::new(HyperparameterKind::Lengthscale, 1., (1e-1, 1e1)).unwrap(),
            Hyperparameter::new(HyperparameterKind::Period, 2., (0.5, 5.)).unwrap(),
        ];
        let kernel = BaseKernel::new(BaseKernelKind::Periodic, params).unwrap();
        let k = kernel.value(&array![0.3], &array![0.3, 2.3, 4.3, 1.3]);
        assert_abs_diff_eq!(k[[0, 0]], 1., epsilon = 1e-12);
        assert_abs_diff_eq!(k[[0, 1]], 1., epsilon = 1e-12);
        assert_abs_diff_eq!(k[[0, 2]], 1., epsilon = 1e-12);
        assert!(k[[0, 3]] < 1.);
    }

    #[test]
    fn test_fixed_variance_has_no_gradient() {
        let kernel = BaseKernel::from_priors(BaseKernelKind::SquaredExponential, &DefaultPriors)
            .with_fixed_variance(1.)
            .unwrap();
        let (_, grads) = kernel.value_and_gradients(&Array1::linspace(0., 1., 4));
        assert_eq!(grads.len(), 1);
        assert!(kernel.has_fixed_variance());
    }

    #[test]
    fn test_hyperparameter_domain() {
        let mut hp = Hyperparameter::new(HyperparameterKind::Period, 3., (0.2, 2.)).unwrap();
        assert_abs_diff_eq!(hp.value(), 2.);
        hp.set_transformed(10.);
        assert_abs_diff_eq!(hp.value(), 2.);
        hp.set_value(0.5);
        assert!(hp.check().is_ok());
        assert!(Hyperparameter::new(HyperparameterKind::Lengthscale, 1., (0., 2.)).is_err());
        assert!(Hyperparameter::new(HyperparameterKind::Location, -1., (-2., 2.)).is_ok());
    }

    #[test]
    fn test_wrong_arity_is_rejected() {
        let params = vec![
            Hyperparameter::new(HyperparameterKind::Variance, 1., (1e-3, 1e3)).unwrap(),
        ];
        assert!(BaseKernel::new(BaseKernelKind::Periodic, params).is_err());
    }

    #[test]
    fn test_kernel_spec_kinds() {
        assert_eq!(KernelSpec::DEFAULT.kinds().len(), 6);
        assert_eq!(
            (KernelSpec::PERIODIC | KernelSpec::CONSTANT).kinds(),
            vec![BaseKernelKind::Constant, BaseKernelKind::Periodic]
        );
        assert!(!KernelSpec::DEFAULT.contains(KernelSpec::MATERN52));
    }
}
