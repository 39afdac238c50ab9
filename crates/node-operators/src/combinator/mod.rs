//! Combinator operators
//!
//! Operators joining several ordered inputs into one output. Only the
//! order of items within each input position is preserved; how positions
//! interleave depends on arrival.

mod combine_latest;
mod merge;
mod zip;

pub use combine_latest::CombineLatestOperator;
pub use merge::MergeOperator;
pub use zip::ZipOperator;

use node_compiler::{ItemStream, OperatorError, Signature, TypePattern};

/// `(T, U) -> (T, U)`
pub(crate) fn pair_signature() -> Signature {
    Signature::fixed(
        vec![TypePattern::Var("T"), TypePattern::Var("U")],
        TypePattern::Tuple(vec![TypePattern::Var("T"), TypePattern::Var("U")]),
    )
}

/// Split exactly two inputs into `(left, right)`
pub(crate) fn two_inputs(
    mut inputs: Vec<ItemStream>,
) -> Result<(ItemStream, ItemStream), OperatorError> {
    match (inputs.pop(), inputs.pop(), inputs.is_empty()) {
        (Some(right), Some(left), true) => Ok((left, right)),
        _ => Err(OperatorError::new("expected exactly two inputs")),
    }
}
