//! Source operators
//!
//! Operators with no inputs that produce the items of a pipeline.

mod interval;
mod range;
mod values;

pub use interval::{IntervalConfig, IntervalOperator};
pub use range::{RangeConfig, RangeOperator};
pub use values::{ValuesConfig, ValuesOperator};
