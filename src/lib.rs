//! Leastsq fits straight lines (and their multi-feature generalization) by
//! ordinary least squares, for WebAssembly and `#![no_std]` environments.
//!
//! # Example
//! ```
//! let xs = [1.0, 2.0, 3.0, 4.0];
//! let ys = [2.0, 4.0, 6.0, 8.0];
//! let line = leastsq::lm::fit(&xs, &ys).unwrap();
//! assert!((line.slope - 2.0).abs() < 1e-9);
//! assert!(line.intercept.abs() < 1e-9);
//! ```
//!
//! The same fit is available through [Estimator] for callers that keep their
//! observations in a feature matrix:
//! ```
//! use leastsq::lm::SimpleLinearRegression;
//! use leastsq::Estimator;
//! use ndarray::array;
//!
//! let xs = array![[0.0, 1.0], [0.0, 2.0], [0.0, 3.0]];
//! let ys = array![3.0, 5.0, 7.0];
//! let model = SimpleLinearRegression {
//!     feature: 1,
//!     ..Default::default()
//! };
//! let result = model.fit(&xs, &ys).unwrap();
//! assert!((result.line.slope - 2.0).abs() < 1e-9);
//! assert!((result.line.intercept - 1.0).abs() < 1e-9);
//! ```
#![no_std]

extern crate alloc;

pub mod lm;

use ndarray::Array1;
use ndarray::Array2;

/// A model that can be fitted to a feature matrix and a target vector.
pub trait Estimator {
    /// The fitted model.
    type T;
    /// Why fitting failed.
    type E;
    /// Fit on `xs` with shape `(n_samples, n_features)` against `ys` with
    /// length `n_samples`.
    fn fit(&self, xs: &Array2<f64>, ys: &Array1<f64>) -> Result<Self::T, Self::E>;
}

/// A fitted model that predicts one target per row of a feature matrix.
pub trait Predictor {
    fn predict(&self, xs: &Array2<f64>) -> Array1<f64>;
}
