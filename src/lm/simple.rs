//! Simple linear regression: one input, one output, closed form.
//!
//! Minimizing `L = Σ (y_i - a x_i - b)²` and setting both partial derivatives
//! to zero gives the normal equations
//!
//! ```text
//! [ Σx²  Σx ] [a]   [ Σxy ]
//! [ Σx   N  ] [b] = [ Σy  ]
//! ```
//!
//! which are solved here with the explicit 2x2 inverse.
//!
//! The sums are taken about the first observation rather than the origin.
//! The normal equations are translation invariant, so the slope is unchanged
//! and the intercept is shifted back afterwards, while data sitting far from
//! zero keeps its precision.

use super::check_lengths;
use super::check_observations;
use super::magnitude;
use super::FitError;
use super::InvalidInput;
use crate::Estimator;
use crate::Predictor;
use alloc::vec::Vec;
use ndarray::Array1;
use ndarray::Array2;
use serde::Deserialize;
use serde::Serialize;

/// Relative tolerance below which the determinant of the normal equations is
/// treated as zero.
///
/// The determinant `N Σx² - (Σx)²` is compared against `N Σx²`, both taken
/// about the first observation.
pub const DEFAULT_SINGULAR_TOLERANCE: f64 = 1e-12;

/// Running sums of the normal equations.
///
/// Accumulators built over disjoint chunks of the observations can be
/// combined with [NormalEquations::merge], so the reductions may run
/// independently.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalEquations {
    n: usize,
    /// First observation pushed; every sum is relative to it.
    origin: Option<(f64, f64)>,
    sum_xx: f64,
    sum_x: f64,
    sum_xy: f64,
    sum_y: f64,
}

impl NormalEquations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, x: f64, y: f64) {
        let (x0, y0) = *self.origin.get_or_insert((x, y));
        let (x, y) = (x - x0, y - y0);
        self.n += 1;
        self.sum_xx += x * x;
        self.sum_x += x;
        self.sum_xy += x * y;
        self.sum_y += y;
    }

    pub fn merge(&mut self, other: &NormalEquations) {
        let Some((other_x0, other_y0)) = other.origin else {
            return;
        };
        let Some((x0, y0)) = self.origin else {
            *self = *other;
            return;
        };
        // Move the other sums onto this origin.
        let (dx, dy) = (other_x0 - x0, other_y0 - y0);
        let n = other.n as f64;
        self.n += other.n;
        self.sum_xx += other.sum_xx + 2.0 * dx * other.sum_x + n * dx * dx;
        self.sum_xy += other.sum_xy + dy * other.sum_x + dx * other.sum_y + n * dx * dy;
        self.sum_x += other.sum_x + n * dx;
        self.sum_y += other.sum_y + n * dy;
    }

    /// Number of observations accumulated so far.
    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Determinant of the 2x2 coefficient matrix, `N Σx² - (Σx)²`.
    pub fn determinant(&self) -> f64 {
        self.sum_xx * self.n as f64 - self.sum_x * self.sum_x
    }

    /// Solve for slope and intercept.
    ///
    /// Fails with [FitError::SingularSystem] when the determinant is within
    /// `tolerance` (relative to `N Σx²`) of zero or is not finite, and with
    /// [FitError::NonFiniteSolution] when the line itself overflows.
    pub fn solve(&self, tolerance: f64) -> Result<LineFit, FitError> {
        if self.n < 2 {
            return Err(InvalidInput::TooFewObservations {
                got: self.n,
                required: 2,
            }
            .into());
        }
        let n = self.n as f64;
        let determinant = self.determinant();
        let scale = self.sum_xx * n;
        // Written so that a NaN determinant also counts as singular.
        if !(magnitude(determinant) > tolerance * scale) || !determinant.is_finite() {
            tracing::warn!(determinant, scale, "singular normal equations");
            return Err(FitError::SingularSystem { determinant });
        }

        let (x0, y0) = self.origin.unwrap_or_default();
        let slope = (n * self.sum_xy - self.sum_x * self.sum_y) / determinant;
        let shifted = (self.sum_xx * self.sum_y - self.sum_x * self.sum_xy) / determinant;
        let intercept = shifted + y0 - slope * x0;
        if !slope.is_finite() || !intercept.is_finite() {
            tracing::warn!(slope, intercept, "fitted line is not finite");
            return Err(FitError::NonFiniteSolution { slope, intercept });
        }
        tracing::debug!(
            n = self.n,
            x0,
            y0,
            sum_xx = self.sum_xx,
            sum_x = self.sum_x,
            sum_xy = self.sum_xy,
            sum_y = self.sum_y,
            slope,
            intercept,
            "solved normal equations"
        );
        Ok(LineFit { slope, intercept })
    }
}

impl FromIterator<(f64, f64)> for NormalEquations {
    fn from_iter<I: IntoIterator<Item = (f64, f64)>>(iter: I) -> Self {
        let mut equations = NormalEquations::new();
        equations.extend(iter);
        equations
    }
}

impl Extend<(f64, f64)> for NormalEquations {
    fn extend<I: IntoIterator<Item = (f64, f64)>>(&mut self, iter: I) {
        for (x, y) in iter {
            self.push(x, y);
        }
    }
}

#[test]
fn test_merge_matches_single_pass() {
    let xs = [0.5, 1.5, 2.0, 4.0, 7.5, 9.0];
    let ys = [1.0, 2.5, 2.0, 5.5, 8.0, 11.0];
    let whole: NormalEquations = xs.iter().copied().zip(ys.iter().copied()).collect();

    let mut left: NormalEquations = xs[..2].iter().copied().zip(ys[..2].iter().copied()).collect();
    let right: NormalEquations = xs[2..].iter().copied().zip(ys[2..].iter().copied()).collect();
    left.merge(&right);

    assert_eq!(left.len(), 6);
    let a = whole.solve(DEFAULT_SINGULAR_TOLERANCE).unwrap();
    let b = left.solve(DEFAULT_SINGULAR_TOLERANCE).unwrap();
    approx::assert_relative_eq!(a.slope, b.slope, max_relative = 1e-12);
    approx::assert_relative_eq!(a.intercept, b.intercept, max_relative = 1e-12);

    let mut empty = NormalEquations::new();
    empty.merge(&whole);
    assert_eq!(empty, whole);
    let mut unchanged = whole;
    unchanged.merge(&NormalEquations::new());
    assert_eq!(unchanged, whole);
}

#[test]
fn test_determinant() {
    let mut equations = NormalEquations::new();
    assert!(equations.is_empty());
    for (x, y) in [(1.0, 2.0), (2.0, 4.0), (3.0, 6.0), (4.0, 8.0)] {
        equations.push(x, y);
    }
    // Taken about (1, 2): 4 * 14 - 6 * 6
    assert_eq!(equations.determinant(), 20.0);

    let mut single = NormalEquations::new();
    single.push(1.0, 1.0);
    assert_eq!(
        single.solve(DEFAULT_SINGULAR_TOLERANCE),
        Err(FitError::InvalidInput(InvalidInput::TooFewObservations {
            got: 1,
            required: 2
        }))
    );
}

/// A straight line `y = slope * x + intercept`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LineFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// `y_i - predict(x_i)` for each pair.
    pub fn residuals(&self, xs: &[f64], ys: &[f64]) -> Result<Vec<f64>, InvalidInput> {
        check_lengths(xs, ys)?;
        Ok(xs
            .iter()
            .zip(ys)
            .map(|(x, y)| y - self.predict(*x))
            .collect())
    }

    pub fn residual_sum_of_squares(&self, xs: &[f64], ys: &[f64]) -> Result<f64, InvalidInput> {
        check_lengths(xs, ys)?;
        Ok(xs
            .iter()
            .zip(ys)
            .map(|(x, y)| {
                let r = y - self.predict(*x);
                r * r
            })
            .sum())
    }

    /// Coefficient of determination.
    ///
    /// When every `y` is the same, a perfect fit scores 1 and anything else 0.
    pub fn r_squared(&self, xs: &[f64], ys: &[f64]) -> Result<f64, InvalidInput> {
        let residual = self.residual_sum_of_squares(xs, ys)?;
        if ys.is_empty() {
            return Ok(0.0);
        }
        let mean = ys.iter().sum::<f64>() / ys.len() as f64;
        let total: f64 = ys.iter().map(|y| (y - mean) * (y - mean)).sum();
        if total == 0.0 {
            return Ok(if residual == 0.0 { 1.0 } else { 0.0 });
        }
        Ok(1.0 - residual / total)
    }

    /// End points of the line over the observed x range, ready to draw over a
    /// scatter plot of the data.
    pub fn segment(&self, xs: &[f64]) -> Option<[(f64, f64); 2]> {
        let first = *xs.first()?;
        let (min, max) = xs
            .iter()
            .fold((first, first), |(lo, hi), x| (lo.min(*x), hi.max(*x)));
        Some([(min, self.predict(min)), (max, self.predict(max))])
    }
}

#[test]
fn test_segment() {
    let line = LineFit {
        slope: 2.0,
        intercept: -1.0,
    };
    assert_eq!(line.segment(&[]), None);
    assert_eq!(
        line.segment(&[3.0, -2.0, 5.0, 0.0]),
        Some([(-2.0, -5.0), (5.0, 9.0)])
    );
}

#[test]
fn test_r_squared_constant_target() {
    let line = LineFit {
        slope: 0.0,
        intercept: 4.0,
    };
    assert_eq!(line.r_squared(&[1.0, 2.0, 3.0], &[4.0, 4.0, 4.0]), Ok(1.0));
    assert_eq!(line.r_squared(&[1.0, 2.0, 3.0], &[5.0, 5.0, 5.0]), Ok(0.0));
}

#[test]
fn test_residuals_reject_mismatched_lengths() {
    let line = LineFit {
        slope: 1.0,
        intercept: 0.0,
    };
    let mismatch = InvalidInput::LengthMismatch { xs: 3, ys: 2 };
    assert_eq!(line.residuals(&[1.0, 2.0, 3.0], &[1.0, 2.0]), Err(mismatch));
    assert_eq!(
        line.residual_sum_of_squares(&[1.0, 2.0, 3.0], &[1.0, 2.0]),
        Err(mismatch)
    );
    assert_eq!(line.r_squared(&[1.0, 2.0, 3.0], &[1.0, 2.0]), Err(mismatch));
    assert_eq!(line.residuals(&[1.0, 2.0], &[1.5, 2.0]), Ok(alloc::vec![0.5, 0.0]));
}

/// Closed-form least squares fit of a straight line.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeastSquaresFitter {
    /// Relative tolerance on the determinant of the normal equations
    /// (default: [DEFAULT_SINGULAR_TOLERANCE]).
    pub singular_tolerance: f64,
}

impl Default for LeastSquaresFitter {
    fn default() -> Self {
        Self {
            singular_tolerance: DEFAULT_SINGULAR_TOLERANCE,
        }
    }
}

impl LeastSquaresFitter {
    /// Fit `y = a x + b` to the pairs `(xs[i], ys[i])`.
    ///
    /// Needs at least two finite observations of equal length and at least
    /// two distinct `x` values.
    pub fn fit(&self, xs: &[f64], ys: &[f64]) -> Result<LineFit, FitError> {
        check_observations(xs, ys)?;
        let equations: NormalEquations = xs.iter().copied().zip(ys.iter().copied()).collect();
        equations.solve(self.singular_tolerance)
    }
}

/// Fit a straight line with the default [LeastSquaresFitter].
pub fn fit(xs: &[f64], ys: &[f64]) -> Result<LineFit, FitError> {
    LeastSquaresFitter::default().fit(xs, ys)
}

/// Simple linear regression against one column of a feature matrix.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimpleLinearRegression {
    /// Column of `xs` used as the input (default: 0).
    pub feature: usize,
    /// See [LeastSquaresFitter::singular_tolerance].
    pub singular_tolerance: f64,
}

impl Default for SimpleLinearRegression {
    fn default() -> Self {
        Self {
            feature: 0,
            singular_tolerance: DEFAULT_SINGULAR_TOLERANCE,
        }
    }
}

/// Result of fitting the Simple Linear Regression.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimpleLinearRegressionResult {
    pub feature: usize,
    pub line: LineFit,
}

impl Estimator for SimpleLinearRegression {
    type T = SimpleLinearRegressionResult;
    type E = FitError;
    fn fit(&self, xs: &Array2<f64>, ys: &Array1<f64>) -> Result<Self::T, Self::E> {
        if self.feature >= xs.ncols() {
            return Err(InvalidInput::FeatureOutOfBounds {
                feature: self.feature,
                ncols: xs.ncols(),
            }
            .into());
        }
        let column = xs.column(self.feature).to_vec();
        let ys = ys.to_vec();
        let fitter = LeastSquaresFitter {
            singular_tolerance: self.singular_tolerance,
        };
        let line = fitter.fit(&column, &ys)?;
        Ok(SimpleLinearRegressionResult {
            feature: self.feature,
            line,
        })
    }
}

impl Predictor for SimpleLinearRegressionResult {
    /// # Panics
    ///
    /// If `xs` has no column `self.feature`.
    fn predict(&self, xs: &Array2<f64>) -> Array1<f64> {
        xs.column(self.feature).mapv(|x| self.line.predict(x))
    }
}
