//! Zip Operator
//!
//! Pairs items from two inputs by position.

use futures::StreamExt;
use node_compiler::{
    Item, Operation, OperatorDefinition, OperatorDescriptor, OperatorError, OperatorRole,
};
use serde_json::json;

use super::{pair_signature, two_inputs};

/// Zip Operator
///
/// `(T, U) -> (T, U)`. The n-th output pairs the n-th item of each input.
/// Completes as soon as either input does; unmatched items are dropped.
pub struct ZipOperator;

impl ZipOperator {
    pub const ID: &'static str = "zip";
    /// Port of the first tuple element
    pub const PORT_LEFT: usize = 0;
    /// Port of the second tuple element
    pub const PORT_RIGHT: usize = 1;
}

impl OperatorDefinition for ZipOperator {
    fn descriptor() -> OperatorDescriptor {
        OperatorDescriptor::new(Self::ID, OperatorRole::Combinator)
            .with_label("Zip")
            .with_description("Pairs the n-th items of both inputs")
            .with_ports(2)
            .with_operation(Operation::combinator("zip", pair_signature(), |inputs, _| {
                let (left, right) = two_inputs(inputs)?;
                Ok(left
                    .zip(right)
                    .map(|(l, r)| -> Result<Item, OperatorError> { Ok(json!([l?, r?])) })
                    .boxed())
            }))
    }
}

inventory::submit!(node_compiler::OperatorFn(ZipOperator::descriptor));
