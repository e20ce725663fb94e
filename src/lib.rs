//! Reverse-mode automatic differentiation over scalar values.
//!
//! Expressions are recorded on a [`Tape`] as they are built, with their values
//! computed immediately. [`TapeTerm::backward`] then fills in the gradient of
//! the chosen output with respect to every term it depends on.
//!
//! ```
//! use tapegrad::Tape;
//!
//! let tape = Tape::new();
//! let a = tape.term("a", 2.);
//! let b = tape.term("b", -3.);
//! let c = tape.term("c", 10.);
//! let d = a * b + c;
//! assert_eq!(d.data(), 4.);
//! d.backward();
//! assert_eq!(a.grad(), -3.);
//! assert_eq!(b.grad(), 2.);
//! ```

mod dot;
pub mod error;
pub mod grad_check;
pub mod tape;

pub use dot::DotBuilder;
pub use error::GradCheckError;
pub use grad_check::{check_grad, GradCheckConfig, GradCheckReport};
pub use tape::{Tape, TapeNode, TapeTerm};
#[cfg(feature = "macro")]
pub use tapegrad_macro::tapegrad;
