//! Linear Models.

mod simple;

pub use simple::*;

use crate::Estimator;
use crate::Predictor;
use faer::linalg::solvers::SolveLstsqCore;
use faer_ext::*;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// Why a set of observations cannot be fitted.
#[derive(Error, Clone, Copy, Debug, PartialEq)]
pub enum InvalidInput {
    #[error("xs has {xs} observations but ys has {ys}")]
    LengthMismatch { xs: usize, ys: usize },
    #[error("need at least {required} observations, got {got}")]
    TooFewObservations { got: usize, required: usize },
    #[error("observation {index} is not finite")]
    NonFinite { index: usize },
    #[error("feature {feature} is out of bounds for {ncols} columns")]
    FeatureOutOfBounds { feature: usize, ncols: usize },
}

#[derive(Error, Clone, Copy, Debug, PartialEq)]
pub enum FitError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInput),
    /// The normal equations have no unique solution, for example because
    /// every `x` is the same.
    #[error("normal equations are singular (determinant {determinant:e})")]
    SingularSystem { determinant: f64 },
    #[error("fitted line is not finite (slope {slope}, intercept {intercept})")]
    NonFiniteSolution { slope: f64, intercept: f64 },
}

pub(crate) fn magnitude(v: f64) -> f64 {
    v.max(-v)
}

fn check_finite<'a>(values: impl IntoIterator<Item = &'a f64>) -> Result<(), InvalidInput> {
    match values.into_iter().position(|v| !v.is_finite()) {
        Some(index) => Err(InvalidInput::NonFinite { index }),
        None => Ok(()),
    }
}

pub(crate) fn check_lengths(xs: &[f64], ys: &[f64]) -> Result<(), InvalidInput> {
    if xs.len() != ys.len() {
        return Err(InvalidInput::LengthMismatch {
            xs: xs.len(),
            ys: ys.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_observations(xs: &[f64], ys: &[f64]) -> Result<(), InvalidInput> {
    check_lengths(xs, ys)?;
    if xs.len() < 2 {
        return Err(InvalidInput::TooFewObservations {
            got: xs.len(),
            required: 2,
        });
    }
    check_finite(xs)?;
    check_finite(ys)
}

struct PreprocessedData {
    xs: Array2<f64>,
    ys: Array1<f64>,
    xs_offset: Array1<f64>,
    y_offset: f64,
}

fn preprocess_data(
    xs: &Array2<f64>,
    ys: &Array1<f64>,
    fit_intercept: bool,
) -> Result<PreprocessedData, InvalidInput> {
    let mut xs = xs.to_owned();
    let mut ys = ys.to_owned();

    if fit_intercept {
        let too_few = InvalidInput::TooFewObservations {
            got: 0,
            required: 1,
        };
        let xs_offset = xs.mean_axis(Axis(0)).ok_or(too_few)?;
        for mut row in xs.axis_iter_mut(Axis(0)) {
            for (i, x) in row.iter_mut().enumerate() {
                *x -= xs_offset[i];
            }
        }

        let y_offset = ys.mean().ok_or(too_few)?;
        for y in ys.iter_mut() {
            *y -= y_offset;
        }

        Ok(PreprocessedData {
            xs,
            ys,
            xs_offset,
            y_offset,
        })
    } else {
        let xs_offset = Array1::zeros(xs.ncols());
        let y_offset = 0.0;
        Ok(PreprocessedData {
            xs,
            ys,
            xs_offset,
            y_offset,
        })
    }
}

#[test]
fn test_preprocess_data() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let xs = Array2::from_shape_vec((3, 2), alloc::vec![1., 10., 2., 20., 3., 60.]).unwrap();
    let ys = Array1::from_vec(alloc::vec![2., 4., 9.]);

    let centered = preprocess_data(&xs, &ys, true).unwrap();
    tracing::info!("centered xs: {:?}", centered.xs);
    assert_eq!(centered.y_offset, 5.);
    assert_eq!(centered.xs_offset, Array1::from_vec(alloc::vec![2., 30.]));
    assert_eq!(centered.ys, Array1::from_vec(alloc::vec![-3., -1., 4.]));
    let expected_xs =
        Array2::from_shape_vec((3, 2), alloc::vec![-1., -20., 0., -10., 1., 30.]).unwrap();
    approx::assert_abs_diff_eq!(centered.xs, expected_xs, epsilon = 1e-12);
    // Every centered column sums to zero.
    for column in centered.xs.axis_iter(Axis(1)) {
        approx::assert_abs_diff_eq!(column.sum(), 0., epsilon = 1e-12);
    }

    let untouched = preprocess_data(&xs, &ys, false).unwrap();
    assert_eq!(untouched.xs, xs);
    assert_eq!(untouched.ys, ys);
    assert_eq!(untouched.y_offset, 0.);
    assert_eq!(untouched.xs_offset, Array1::zeros(2));

    let empty = Array2::<f64>::zeros((0, 2));
    assert!(preprocess_data(&empty, &Array1::zeros(0), true).is_err());
}

/// Columns that carry no variation after preprocessing make the least
/// squares problem rank deficient.
fn constant_column(original: &Array2<f64>, centered: &Array2<f64>) -> Option<usize> {
    let spread = |column: ndarray::ArrayView1<f64>| {
        column.iter().fold(0.0_f64, |acc, v| acc.max(magnitude(*v)))
    };
    original
        .axis_iter(Axis(1))
        .zip(centered.axis_iter(Axis(1)))
        .position(|(o, c)| spread(c) <= DEFAULT_SINGULAR_TOLERANCE * spread(o))
}

struct LstsqResult {
    pub coef: Array1<f64>,
}

fn lstsq(xs: &Array2<f64>, ys: &Array1<f64>) -> LstsqResult {
    let xs_f = xs.view().into_faer();
    let xs_qr = xs_f.cloned();

    let solution = ys.view().insert_axis(Axis(1));
    let mut solution_f = solution.into_faer().to_owned();
    let solution_mut = solution_f.as_mut();

    let qr = xs_qr.qr();
    let conj = faer::Conj::No;
    qr.solve_lstsq_in_place_with_conj(conj, solution_mut);
    let coef = solution_f.subrows(0, xs.ncols());
    let coef = coef.into_ndarray().to_owned();
    let coef = Array1::from_iter(coef);
    LstsqResult { coef }
}

/// Ordinary least squares Linear Regression.
///
/// Fits a linear model with coefficients `w = (w1, ..., wp)` to minimize the
/// residual sum of squares between the observed targets in the dataset, and the
/// targets predicted by the linear approximation.
///
/// With a single feature this solves the same problem as [LeastSquaresFitter],
/// through a QR decomposition instead of the 2x2 normal equations.
#[derive(Clone, Debug, Hash, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    /// Whether to fit the intercept (default: true).
    ///
    /// If set to `false`, no intercept will be used in calculations (i.e. data
    /// is expected to be centered).
    pub fit_intercept: bool,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self {
            fit_intercept: true,
        }
    }
}

/// Result of fitting the Linear Regression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearRegressionResult {
    pub intercept: f64,
    pub coefficients: Array1<f64>,
}

impl Estimator for LinearRegression {
    type T = LinearRegressionResult;
    type E = FitError;
    fn fit(&self, xs: &Array2<f64>, ys: &Array1<f64>) -> Result<Self::T, Self::E> {
        if xs.nrows() != ys.len() {
            return Err(InvalidInput::LengthMismatch {
                xs: xs.nrows(),
                ys: ys.len(),
            }
            .into());
        }
        let required = (xs.ncols() + usize::from(self.fit_intercept)).max(1);
        if xs.nrows() < required {
            return Err(InvalidInput::TooFewObservations {
                got: xs.nrows(),
                required,
            }
            .into());
        }
        for (index, row) in xs.axis_iter(Axis(0)).enumerate() {
            if check_finite(row.iter()).is_err() || !ys[index].is_finite() {
                return Err(InvalidInput::NonFinite { index }.into());
            }
        }

        // This doesn't add a 1s column to the data because the data was already
        // centered. This is faster than adding the column.
        let preprocessed = preprocess_data(xs, ys, self.fit_intercept)?;
        if xs.ncols() == 0 {
            return Ok(LinearRegressionResult {
                intercept: preprocessed.y_offset,
                coefficients: Array1::zeros(0),
            });
        }
        if let Some(column) = constant_column(xs, &preprocessed.xs) {
            tracing::warn!("feature column {column} has no variation");
            return Err(FitError::SingularSystem { determinant: 0.0 });
        }

        let lstsq_result = lstsq(&preprocessed.xs, &preprocessed.ys);
        if lstsq_result.coef.iter().any(|c| !c.is_finite()) {
            tracing::warn!("least squares solution is not finite");
            return Err(FitError::SingularSystem { determinant: 0.0 });
        }
        let intercept = if self.fit_intercept {
            preprocessed.y_offset - preprocessed.xs_offset.dot(&lstsq_result.coef)
        } else {
            0.0
        };
        tracing::debug!(intercept, coefficients = ?lstsq_result.coef, "fitted linear regression");

        Ok(LinearRegressionResult {
            intercept,
            coefficients: lstsq_result.coef,
        })
    }
}

impl Predictor for LinearRegressionResult {
    fn predict(&self, xs: &Array2<f64>) -> Array1<f64> {
        xs.dot(&self.coefficients) + self.intercept
    }
}
