use thiserror::Error;

/// Reasons for [`crate::check_grad`] to reject a function.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradCheckError {
    #[error("finite difference step must be positive and finite, got {epsilon}")]
    InvalidEpsilon { epsilon: f64 },
    #[error("function output is not finite at the checked point: {value}")]
    NonFiniteOutput { value: f64 },
    #[error("analytical gradient for input {input_index} is not finite: {value}")]
    NonFiniteGradient { input_index: usize, value: f64 },
    #[error("gradient mismatch for input {input_index}: analytical {analytical} != numerical {numerical} (difference {difference})")]
    GradientMismatch {
        input_index: usize,
        analytical: f64,
        numerical: f64,
        difference: f64,
    },
}
