//! Finite difference verification of the gradients computed by
//! [`TapeTerm::backward`](crate::TapeTerm::backward).
//!
//! The function under test is rebuilt on a fresh [`Tape`] for every
//! evaluation, since node values are fixed once recorded.

use log::debug;

use crate::{error::GradCheckError, Tape, TapeTerm};

#[derive(Debug, Clone)]
pub struct GradCheckConfig {
    /// Step size for finite differences
    pub epsilon: f64,
    /// Relative tolerance for gradient comparison
    pub rtol: f64,
    /// Absolute tolerance for gradient comparison
    pub atol: f64,
    /// Use central difference (more accurate but 2x slower)
    pub use_central_diff: bool,
}

impl Default for GradCheckConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-5,
            rtol: 1e-3,
            atol: 1e-5,
            use_central_diff: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradCheckReport {
    /// Output of the function at the checked point
    pub value: f64,
    pub analytical: Vec<f64>,
    pub numerical: Vec<f64>,
    pub max_abs_diff: f64,
}

/// Compares the gradient of `f` at `inputs` obtained by backpropagation with
/// the one obtained by finite differences.
///
/// `f` receives one named leaf per input (`x0`, `x1`, ...) and returns the output term.
/// An input passes if `|analytical - numerical| <= atol + rtol * |numerical|`.
pub fn check_grad<F>(
    f: F,
    inputs: &[f64],
    config: &GradCheckConfig,
) -> Result<GradCheckReport, GradCheckError>
where
    F: for<'a> Fn(&'a Tape, &[TapeTerm<'a>]) -> TapeTerm<'a>,
{
    let h = config.epsilon;
    if !(h > 0. && h.is_finite()) {
        return Err(GradCheckError::InvalidEpsilon { epsilon: h });
    }

    let (value, analytical) = evaluate(&f, inputs, true);
    if !value.is_finite() {
        return Err(GradCheckError::NonFiniteOutput { value });
    }
    if let Some((input_index, &value)) = analytical.iter().enumerate().find(|(_, g)| !g.is_finite())
    {
        return Err(GradCheckError::NonFiniteGradient { input_index, value });
    }

    let mut numerical = Vec::with_capacity(inputs.len());
    let mut max_abs_diff = 0f64;
    for (input_index, &analytical) in analytical.iter().enumerate() {
        let mut shifted = inputs.to_vec();
        shifted[input_index] = inputs[input_index] + h;
        let (plus, _) = evaluate(&f, &shifted, false);
        let numerical_grad = if config.use_central_diff {
            shifted[input_index] = inputs[input_index] - h;
            let (minus, _) = evaluate(&f, &shifted, false);
            (plus - minus) / (2. * h)
        } else {
            (plus - value) / h
        };

        let difference = (analytical - numerical_grad).abs();
        debug!(
            "check_grad: x{input_index}: analytical = {analytical}, numerical = {numerical_grad}"
        );
        // Negated so that a NaN difference fails too.
        if !(difference <= config.atol + config.rtol * numerical_grad.abs()) {
            return Err(GradCheckError::GradientMismatch {
                input_index,
                analytical,
                numerical: numerical_grad,
                difference,
            });
        }
        max_abs_diff = max_abs_diff.max(difference);
        numerical.push(numerical_grad);
    }

    Ok(GradCheckReport {
        value,
        analytical,
        numerical,
        max_abs_diff,
    })
}

fn evaluate<F>(f: &F, inputs: &[f64], with_grad: bool) -> (f64, Vec<f64>)
where
    F: for<'a> Fn(&'a Tape, &[TapeTerm<'a>]) -> TapeTerm<'a>,
{
    let tape = Tape::new();
    let terms: Vec<_> = inputs
        .iter()
        .enumerate()
        .map(|(i, &x)| tape.term(format!("x{i}"), x))
        .collect();
    let output = f(&tape, &terms);
    let value = output.data();
    let grads = if with_grad {
        output.backward();
        terms.iter().map(|term| term.grad()).collect()
    } else {
        vec![]
    };
    (value, grads)
}
