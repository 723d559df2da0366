use approx::assert_abs_diff_eq;
use approx::assert_relative_eq;
use leastsq::lm;
use leastsq::lm::FitError;
use leastsq::lm::InvalidInput;
use leastsq::lm::LeastSquaresFitter;
use leastsq::lm::LineFit;
use leastsq::lm::NormalEquations;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[test]
fn test_exact_line() {
    init_tracing();
    let line = lm::fit(&[1.0, 2.0, 3.0, 4.0], &[2.0, 4.0, 6.0, 8.0]).unwrap();
    assert_abs_diff_eq!(line.slope, 2.0, epsilon = 1e-9);
    assert_abs_diff_eq!(line.intercept, 0.0, epsilon = 1e-9);
}

#[test]
fn test_collinear_recovers_parameters() {
    init_tracing();
    let xs = [-2.0, 0.5, 1.0, 4.0, 7.25];
    let ys: Vec<f64> = xs.iter().map(|x| -3.5 * x + 12.25).collect();
    let line = lm::fit(&xs, &ys).unwrap();
    assert_relative_eq!(line.slope, -3.5, max_relative = 1e-9);
    assert_relative_eq!(line.intercept, 12.25, max_relative = 1e-9);
    assert_abs_diff_eq!(line.r_squared(&xs, &ys).unwrap(), 1.0, epsilon = 1e-12);
}

#[test]
fn test_noisy_line() {
    init_tracing();
    let xs = [0.0, 1.0, 2.0, 3.0];
    let ys = [1.0, 2.9, 5.1, 7.0];
    let line = lm::fit(&xs, &ys).unwrap();
    assert_abs_diff_eq!(line.slope, 2.0, epsilon = 0.3);
    assert_abs_diff_eq!(line.intercept, 1.0, epsilon = 0.3);
    assert_abs_diff_eq!(line.slope, 2.02, epsilon = 1e-9);
    assert_abs_diff_eq!(line.intercept, 0.97, epsilon = 1e-9);
}

#[test]
fn test_residual_gradient_is_zero() {
    init_tracing();
    let xs = [0.3, 1.7, 2.2, 3.9, 5.0, 6.4, 8.8];
    let ys = [1.1, 2.0, 4.7, 4.1, 7.9, 7.2, 11.5];
    let line = lm::fit(&xs, &ys).unwrap();

    let residuals = line.residuals(&xs, &ys).unwrap();
    let along_x: f64 = residuals.iter().zip(&xs).map(|(r, x)| r * x).sum();
    let total: f64 = residuals.iter().sum();
    assert_abs_diff_eq!(along_x, 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(total, 0.0, epsilon = 1e-9);

    // Any nudge away from the fit does worse.
    let best = line.residual_sum_of_squares(&xs, &ys).unwrap();
    for (da, db) in [(1e-3, 0.0), (-1e-3, 0.0), (0.0, 1e-3), (0.0, -1e-3)] {
        let other = LineFit {
            slope: line.slope + da,
            intercept: line.intercept + db,
        };
        assert!(other.residual_sum_of_squares(&xs, &ys).unwrap() > best);
    }
}

#[test]
fn test_scaling() {
    init_tracing();
    let xs = [0.3, 1.7, 2.2, 3.9, 5.0];
    let ys = [1.1, 2.0, 4.7, 4.1, 7.9];
    let line = lm::fit(&xs, &ys).unwrap();

    let k = 3.0;
    let scaled_ys: Vec<f64> = ys.iter().map(|y| k * y).collect();
    let scaled = lm::fit(&xs, &scaled_ys).unwrap();
    assert_relative_eq!(scaled.slope, k * line.slope, max_relative = 1e-9);
    assert_relative_eq!(scaled.intercept, k * line.intercept, max_relative = 1e-9);

    let k = -4.0;
    let scaled_xs: Vec<f64> = xs.iter().map(|x| k * x).collect();
    let scaled = lm::fit(&scaled_xs, &ys).unwrap();
    assert_relative_eq!(scaled.slope, line.slope / k, max_relative = 1e-9);
    assert_relative_eq!(scaled.intercept, line.intercept, max_relative = 1e-9);
}

#[test]
fn test_singular() {
    init_tracing();
    let err = lm::fit(&[5.0, 5.0, 5.0], &[1.0, 2.0, 3.0]).unwrap_err();
    assert_eq!(err, FitError::SingularSystem { determinant: 0.0 });

    let strict = LeastSquaresFitter {
        singular_tolerance: 0.5,
    };
    let err = strict.fit(&[1.0, 2.0], &[1.0, 2.0]).unwrap_err();
    assert!(matches!(err, FitError::SingularSystem { .. }));
}

#[test]
fn test_far_from_origin() {
    init_tracing();
    let line = lm::fit(&[1e6, 1e6 + 1.0], &[0.0, 1.0]).unwrap();
    assert_abs_diff_eq!(line.slope, 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(line.intercept, -1e6, epsilon = 1e-6);

    // An hour of unix timestamps.
    let xs: Vec<f64> = (0..60).map(|i| 1_700_000_000.0 + 60.0 * i as f64).collect();
    let ys: Vec<f64> = (0..60).map(|i| 20.0 + 0.5 * i as f64).collect();
    let line = lm::fit(&xs, &ys).unwrap();
    assert_relative_eq!(line.slope, 0.5 / 60.0, max_relative = 1e-9);
    assert_abs_diff_eq!(line.predict(xs[10]), 25.0, epsilon = 1e-6);
}

#[test]
fn test_huge_values() {
    init_tracing();
    let line = lm::fit(&[1.0, 2.0], &[1e308, 1e308]).unwrap();
    assert_eq!(line.slope, 0.0);
    assert_eq!(line.intercept, 1e308);

    // The exact slope, 2e308, is not representable.
    let err = lm::fit(&[0.0, 1.0], &[-1e308, 1e308]).unwrap_err();
    assert!(matches!(err, FitError::NonFiniteSolution { .. }));
}

#[test]
fn test_invalid_input() {
    init_tracing();
    assert_eq!(
        lm::fit(&[1.0], &[2.0]).unwrap_err(),
        FitError::InvalidInput(InvalidInput::TooFewObservations {
            got: 1,
            required: 2
        })
    );
    assert_eq!(
        lm::fit(&[1.0, 2.0, 3.0], &[2.0, 3.0]).unwrap_err(),
        FitError::InvalidInput(InvalidInput::LengthMismatch { xs: 3, ys: 2 })
    );
    assert_eq!(
        lm::fit(&[1.0, 2.0, 3.0], &[2.0, f64::INFINITY, 4.0]).unwrap_err(),
        FitError::InvalidInput(InvalidInput::NonFinite { index: 1 })
    );
    let message = lm::fit(&[], &[]).unwrap_err().to_string();
    assert_eq!(message, "invalid input: need at least 2 observations, got 0");
}

#[test]
fn test_chunked_accumulation() {
    init_tracing();
    let xs: Vec<f64> = (0..100).map(|i| i as f64 * 0.37).collect();
    let ys: Vec<f64> = xs.iter().map(|x| 1.5 * x - 2.0 + (x * 7.0).sin()).collect();

    let merged = xs
        .chunks(17)
        .zip(ys.chunks(17))
        .map(|(cx, cy)| cx.iter().copied().zip(cy.iter().copied()).collect::<NormalEquations>())
        .fold(NormalEquations::new(), |mut acc, part| {
            acc.merge(&part);
            acc
        });
    assert_eq!(merged.len(), 100);

    let chunked = merged.solve(lm::DEFAULT_SINGULAR_TOLERANCE).unwrap();
    let whole = lm::fit(&xs, &ys).unwrap();
    assert_relative_eq!(chunked.slope, whole.slope, max_relative = 1e-9);
    assert_relative_eq!(chunked.intercept, whole.intercept, max_relative = 1e-9);
}

#[test]
fn test_segment_for_plotting() {
    init_tracing();
    let xs = [0.0, 1.0, 2.0, 3.0];
    let ys = [1.0, 2.9, 5.1, 7.0];
    let line = lm::fit(&xs, &ys).unwrap();
    let [(x_min, y_min), (x_max, y_max)] = line.segment(&xs).unwrap();
    assert_eq!((x_min, x_max), (0.0, 3.0));
    assert_abs_diff_eq!(y_min, line.intercept, epsilon = 1e-12);
    assert_abs_diff_eq!(y_max, 3.0 * line.slope + line.intercept, epsilon = 1e-12);
}

#[test]
fn test_serde() {
    let fitter: LeastSquaresFitter = serde_json::from_str(r#"{"singular_tolerance":1e-9}"#).unwrap();
    assert_eq!(fitter.singular_tolerance, 1e-9);

    let line = LineFit {
        slope: 2.0,
        intercept: 0.5,
    };
    let json = serde_json::to_string(&line).unwrap();
    assert_eq!(json, r#"{"slope":2.0,"intercept":0.5}"#);
}
