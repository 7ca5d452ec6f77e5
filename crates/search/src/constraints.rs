//! Data-dependent domains and initial values of kernel hyperparameters.
//!
//! A [`ConstraintSet`] is computed once from the statistics of the dataset and shared
//! read-only by the grammar (fresh leaves take its prior modes) and the fits (optimizers
//! stay within its bounds).

use autokernel_gp::kernels::{DefaultPriors, Hyperparameter};
use autokernel_gp::{BaseKernelKind, HyperparameterKind, HyperparameterPriors};
use ndarray::{Array1, ArrayView1, Zip};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Ratio between the smallest and the largest variance bounds and the data second moment
const VARIANCE_RANGE: (f64, f64) = (1e-6, 1e2);
/// Ratio between the largest noise variance and the data second moment
const NOISE_MAX_RATIO: f64 = 10.;
/// Frequency oversampling of the periodogram
const PERIODOGRAM_OVERSAMPLING: f64 = 4.;
/// Max number of periodogram frequencies
const PERIODOGRAM_MAX_FREQS: usize = 2000;

/// Summary statistics of a one-dimensional dataset
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatasetStats {
    /// Number of points
    pub n: usize,
    /// Smallest input
    pub x_min: f64,
    /// Largest input
    pub x_max: f64,
    /// Input span (1 when degenerate)
    pub span: f64,
    /// Minimum spacing between sorted distinct inputs (1 when degenerate)
    pub min_spacing: f64,
    /// Output mean
    pub y_mean: f64,
    /// Output variance
    pub y_var: f64,
    /// Output second moment `mean(y^2)` (1 when null)
    pub second_moment: f64,
    /// Period of the strongest periodogram component within `[2 min_spacing, span]`,
    /// `None` when outputs are constant
    pub dominant_period: Option<f64>,
}

impl DatasetStats {
    /// Statistics of non-empty finite `x` and `y` of the same length
    pub fn new(x: &ArrayView1<f64>, y: &ArrayView1<f64>) -> Self {
        let n = x.len();
        let x_min = x.iter().copied().fold(f64::INFINITY, f64::min);
        let x_max = x.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut sorted = x.to_vec();
        sorted.sort_by(f64::total_cmp);
        let min_gap = sorted
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|d| *d > 0.)
            .fold(f64::INFINITY, f64::min);

        let (span, min_spacing) = if n < 2 || !(x_max - x_min > 0.) {
            (1., 1.)
        } else {
            (x_max - x_min, min_gap)
        };
        let (x_min, x_max) = if n == 0 { (0., 0.) } else { (x_min, x_max) };

        let nf = n.max(1) as f64;
        let y_mean = y.sum() / nf;
        let y_var = y.mapv(|v| (v - y_mean) * (v - y_mean)).sum() / nf;
        let m2 = y.mapv(|v| v * v).sum() / nf;
        let second_moment = if m2 > 0. { m2 } else { 1. };

        let mut stats = DatasetStats {
            n,
            x_min,
            x_max,
            span,
            min_spacing,
            y_mean,
            y_var,
            second_moment,
            dominant_period: None,
        };
        if y_var > 0. && n > 2 {
            let (lo, up) = stats.period_bounds();
            stats.dominant_period = dominant_period(x, &y.mapv(|v| v - y_mean).view(), lo, up);
        }
        stats
    }

    /// Admissible periods `[2 min_spacing, span]`
    pub fn period_bounds(&self) -> (f64, f64) {
        ((2. * self.min_spacing).min(self.span), self.span)
    }
}

/// Period maximizing the power `|sum_i y_i exp(-2i pi f x_i)|^2` over frequencies
/// in `[1/up, 1/lo]`
fn dominant_period(x: &ArrayView1<f64>, y: &ArrayView1<f64>, lo: f64, up: f64) -> Option<f64> {
    let (f_min, f_max) = (1. / up, 1. / lo);
    let step = 1. / (PERIODOGRAM_OVERSAMPLING * up);
    let n_freqs = (((f_max - f_min) / step).ceil() as usize + 1).min(PERIODOGRAM_MAX_FREQS);
    let freqs = Array1::linspace(f_min, f_max, n_freqs.max(2));
    let power = |f: f64| {
        let (re, im) = Zip::from(x).and(y).fold((0., 0.), |(re, im), &xi, &yi| {
            let phase = 2. * PI * f * xi;
            (re + yi * phase.cos(), im - yi * phase.sin())
        });
        re * re + im * im
    };
    let (best_f, best_power) = freqs
        .iter()
        .map(|&f| (f, power(f)))
        .fold((f_min, 0.), |best, cur| if cur.1 > best.1 { cur } else { best });
    if best_power > 0. {
        Some((1. / best_f).clamp(lo, up))
    } else {
        None
    }
}

/// Domain and initial value of a hyperparameter
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HyperBounds {
    /// Lower bound
    pub lower: f64,
    /// Upper bound
    pub upper: f64,
    /// Initial value of freshly created hyperparameters
    pub prior_mode: f64,
}

impl HyperBounds {
    fn new(lower: f64, upper: f64, prior_mode: f64) -> Self {
        HyperBounds {
            lower,
            upper,
            prior_mode: prior_mode.clamp(lower, upper),
        }
    }

    fn log_middle(lower: f64, upper: f64) -> Self {
        Self::new(lower, upper, (lower * upper).sqrt())
    }
}

/// Hyperparameter domains derived from dataset statistics
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSet {
    stats: DatasetStats,
}

impl ConstraintSet {
    /// Constraints of a dataset described by `stats`
    pub fn new(stats: DatasetStats) -> Self {
        ConstraintSet { stats }
    }

    /// Constraints of the dataset `(x, y)`
    pub fn from_data(x: &ArrayView1<f64>, y: &ArrayView1<f64>) -> Self {
        Self::new(DatasetStats::new(x, y))
    }

    /// Dataset statistics
    pub fn stats(&self) -> &DatasetStats {
        &self.stats
    }

    /// Bounds and prior mode of hyperparameter `hp` of a base kernel of type `kind`
    pub fn bounds_for(&self, kind: BaseKernelKind, hp: HyperparameterKind) -> HyperBounds {
        let s = &self.stats;
        let a = s.second_moment;
        let (span, delta) = (s.span, s.min_spacing);
        match (kind, hp) {
            (BaseKernelKind::WhiteNoise, HyperparameterKind::Variance) => {
                HyperBounds::new(VARIANCE_RANGE.0 * a, NOISE_MAX_RATIO * a, 0.1 * a)
            }
            (BaseKernelKind::Linear, HyperparameterKind::Variance) => {
                let scale = a / (span * span);
                HyperBounds::new(VARIANCE_RANGE.0 * scale, VARIANCE_RANGE.1 * scale, scale)
            }
            (_, HyperparameterKind::Variance) => {
                HyperBounds::new(VARIANCE_RANGE.0 * a, VARIANCE_RANGE.1 * a, a)
            }
            (BaseKernelKind::Periodic, HyperparameterKind::Period) => {
                let (lo, up) = s.period_bounds();
                let mode = s.dominant_period.unwrap_or((lo * up).sqrt());
                HyperBounds::new(lo, up, mode)
            }
            (BaseKernelKind::Periodic, HyperparameterKind::Lengthscale) => {
                HyperBounds::new(0.1, 10., 1.)
            }
            (_, HyperparameterKind::Lengthscale) => {
                HyperBounds::new(0.5 * delta, 0.5 * span, 0.1 * span)
            }
            (_, HyperparameterKind::Alpha) => HyperBounds::new(1e-2, 1e2, 1.),
            (_, HyperparameterKind::Location) => HyperBounds::new(
                s.x_min - span,
                s.x_max + span,
                0.5 * (s.x_min + s.x_max),
            ),
            (_, HyperparameterKind::Period) | (_, HyperparameterKind::Steepness) => {
                HyperBounds::log_middle(VARIANCE_RANGE.0, VARIANCE_RANGE.1)
            }
        }
    }

    /// Bounds and prior mode of the changepoint hyperparameter `hp`
    pub fn changepoint_bounds(&self, hp: HyperparameterKind) -> HyperBounds {
        let s = &self.stats;
        match hp {
            HyperparameterKind::Location => {
                HyperBounds::new(s.x_min, s.x_max, 0.5 * (s.x_min + s.x_max))
            }
            _ => HyperBounds::log_middle(1. / s.span, 10. / s.min_spacing),
        }
    }
}

fn hyperparameter(hp: HyperparameterKind, b: HyperBounds) -> Option<Hyperparameter> {
    Hyperparameter::new(hp, b.prior_mode, (b.lower, b.upper)).ok()
}

impl HyperparameterPriors for ConstraintSet {
    fn base(&self, kind: BaseKernelKind, hp: HyperparameterKind) -> Hyperparameter {
        hyperparameter(hp, self.bounds_for(kind, hp)).unwrap_or_else(|| DefaultPriors.base(kind, hp))
    }

    fn changepoint(&self, hp: HyperparameterKind) -> Hyperparameter {
        hyperparameter(hp, self.changepoint_bounds(hp))
            .unwrap_or_else(|| DefaultPriors.changepoint(hp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use autokernel_gp::kernels::BaseKernel;
    use ndarray::array;

    fn sine(n: usize, span: f64, period: f64) -> (Array1<f64>, Array1<f64>) {
        let x = Array1::linspace(0., span, n);
        let y = x.mapv(|v| (2. * PI * v / period).sin());
        (x, y)
    }

    #[test]
    fn test_dataset_stats() {
        let x = array![3., 0., 1., 1., 5.];
        let y = array![1., 1., 1., 1., 1.];
        let stats = DatasetStats::new(&x.view(), &y.view());
        assert_eq!(stats.n, 5);
        assert_abs_diff_eq!(stats.span, 5.);
        assert_abs_diff_eq!(stats.min_spacing, 1.);
        assert_abs_diff_eq!(stats.y_var, 0.);
        assert_abs_diff_eq!(stats.second_moment, 1.);
        assert_eq!(stats.dominant_period, None);
    }

    #[test]
    fn test_degenerate_stats() {
        let x = array![2., 2., 2.];
        let y = array![0., 0., 0.];
        let stats = DatasetStats::new(&x.view(), &y.view());
        assert_abs_diff_eq!(stats.span, 1.);
        assert_abs_diff_eq!(stats.min_spacing, 1.);
        assert_abs_diff_eq!(stats.second_moment, 1.);
        let constraints = ConstraintSet::new(stats);
        for kind in BaseKernelKind::ALL {
            let kernel = BaseKernel::from_priors(kind, &constraints);
            assert!(kernel.check_domain().is_ok());
        }
    }

    #[test]
    fn test_periodogram_finds_period() {
        let (x, y) = sine(100, 10., 1.);
        let stats = DatasetStats::new(&x.view(), &y.view());
        assert_abs_diff_eq!(stats.dominant_period.unwrap(), 1., epsilon = 0.03);
    }

    #[test]
    fn test_period_bounds() {
        let (x, y) = sine(100, 10., 1.);
        let constraints = ConstraintSet::from_data(&x.view(), &y.view());
        let delta = 10. / 99.;
        let b = constraints.bounds_for(BaseKernelKind::Periodic, HyperparameterKind::Period);
        assert_abs_diff_eq!(b.lower, 2. * delta, epsilon = 1e-12);
        assert_abs_diff_eq!(b.upper, 10., epsilon = 1e-12);
        assert!(b.prior_mode >= b.lower && b.prior_mode <= b.upper);

        let per = BaseKernel::from_priors(BaseKernelKind::Periodic, &constraints);
        let period = per.params()[2].bounds();
        assert_abs_diff_eq!(period.0, 2. * delta, epsilon = 1e-12);
        assert_abs_diff_eq!(period.1, 10., epsilon = 1e-12);
    }

    #[test]
    fn test_lengthscale_below_span() {
        let (x, y) = sine(50, 4., 1.);
        let constraints = ConstraintSet::from_data(&x.view(), &y.view());
        for kind in [
            BaseKernelKind::SquaredExponential,
            BaseKernelKind::RationalQuadratic,
            BaseKernelKind::Matern52,
        ] {
            let b = constraints.bounds_for(kind, HyperparameterKind::Lengthscale);
            assert!(b.upper < 4.);
            assert_abs_diff_eq!(b.prior_mode, 0.4, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_noise_floor_is_positive() {
        let x = Array1::linspace(0., 1., 10);
        let y = Array1::zeros(10);
        let constraints = ConstraintSet::from_data(&x.view(), &y.view());
        let b = constraints.bounds_for(BaseKernelKind::WhiteNoise, HyperparameterKind::Variance);
        assert!(b.lower > 0.);
        assert_abs_diff_eq!(b.lower, 1e-6);
    }

    #[test]
    fn test_changepoint_bounds() {
        let x = Array1::linspace(-2., 6., 20);
        let y = x.mapv(f64::sin);
        let constraints = ConstraintSet::from_data(&x.view(), &y.view());
        let loc = constraints.changepoint(HyperparameterKind::Location);
        assert_eq!(loc.bounds(), (-2., 6.));
        assert_abs_diff_eq!(loc.value(), 2.);
        let steep = constraints.changepoint(HyperparameterKind::Steepness);
        assert!(steep.bounds().0 > 0.);
    }
}
