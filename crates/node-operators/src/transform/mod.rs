//! Transform operators
//!
//! Operators with one input and one output.

mod accumulate;
mod scale;
mod skip;
mod take;
mod to_text;

pub use accumulate::AccumulateOperator;
pub use scale::{ScaleConfig, ScaleOperator};
pub use skip::{SkipConfig, SkipOperator};
pub use take::{TakeConfig, TakeOperator};
pub use to_text::ToTextOperator;

use node_compiler::{Item, OperatorError, Signature, TypePattern};

/// `(T) -> T`
pub(crate) fn passthrough() -> Signature {
    Signature::unary(TypePattern::Var("T"), TypePattern::Var("T"))
}

pub(crate) fn expect_i64(item: &Item) -> Result<i64, OperatorError> {
    item.as_i64()
        .ok_or_else(|| OperatorError::new(format!("expected an int, got {}", item)))
}

pub(crate) fn expect_f64(item: &Item) -> Result<f64, OperatorError> {
    item.as_f64()
        .ok_or_else(|| OperatorError::new(format!("expected a number, got {}", item)))
}
