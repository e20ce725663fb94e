use approx::assert_abs_diff_eq;
use tapegrad::{check_grad, GradCheckConfig, GradCheckError};

#[test]
fn polynomial() {
    let report = check_grad(
        |_, x| x[0].pow(3.) * x[1] + x[1].pow(2.),
        &[1.5, -2.],
        &GradCheckConfig::default(),
    )
    .unwrap();
    assert_abs_diff_eq!(report.value, 1.5f64.powi(3) * -2. + 4., epsilon = 1e-12);
    assert_abs_diff_eq!(report.analytical[0], 3. * 1.5 * 1.5 * -2., epsilon = 1e-12);
    assert_abs_diff_eq!(report.analytical[1], 1.5f64.powi(3) - 4., epsilon = 1e-12);
    assert_abs_diff_eq!(report.numerical[0], report.analytical[0], epsilon = 1e-4);
    assert!(report.max_abs_diff < 1e-4);
}

#[test]
fn forward_difference() {
    let config = GradCheckConfig {
        use_central_diff: false,
        rtol: 1e-2,
        ..GradCheckConfig::default()
    };
    let report = check_grad(|_, x| (x[0] * x[1]).relu() / x[1], &[2., 0.5], &config).unwrap();
    assert_abs_diff_eq!(report.analytical[0], 1., epsilon = 1e-12);
    assert_abs_diff_eq!(report.analytical[1], 0., epsilon = 1e-12);
}

#[test]
fn shared_subexpression() {
    let report = check_grad(
        |tape, x| {
            let h = x[0] * x[1] + tape.value(1.);
            h * h - h
        },
        &[0.3, 0.8],
        &GradCheckConfig::default(),
    )
    .unwrap();
    // d/dh (h^2 - h) = 2h - 1, h = 1.24
    assert_abs_diff_eq!(report.analytical[0], (2. * 1.24 - 1.) * 0.8, epsilon = 1e-12);
}

#[test]
fn kink_is_detected() {
    // Finite differences straddle the ReLU kink, backprop takes the zero subgradient.
    let res = check_grad(|_, x| x[0].relu(), &[0.], &GradCheckConfig::default());
    match res {
        Err(GradCheckError::GradientMismatch {
            input_index,
            analytical,
            numerical,
            ..
        }) => {
            assert_eq!(input_index, 0);
            assert_eq!(analytical, 0.);
            assert_abs_diff_eq!(numerical, 0.5, epsilon = 1e-9);
        }
        other => panic!("expected a mismatch, got {other:?}"),
    }
}

#[test]
fn non_finite() {
    let res = check_grad(|_, x| x[0].pow(0.5), &[-1.], &GradCheckConfig::default());
    assert!(matches!(res, Err(GradCheckError::NonFiniteOutput { .. })));

    let res = check_grad(|_, x| x[0].pow(0.5), &[0.], &GradCheckConfig::default());
    assert_eq!(
        res,
        Err(GradCheckError::NonFiniteGradient {
            input_index: 0,
            value: f64::INFINITY
        })
    );
}

#[test]
fn error_messages() {
    let err = GradCheckError::InvalidEpsilon { epsilon: -1. };
    assert_eq!(
        err.to_string(),
        "finite difference step must be positive and finite, got -1"
    );
}
