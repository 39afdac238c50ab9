//! Accumulate Operator
//!
//! Emits the running sum of a numeric stream.

use futures::{future, StreamExt};
use node_compiler::{
    DataType, Operation, OperatorDefinition, OperatorDescriptor, OperatorError, OperatorRole,
    Signature,
};
use serde_json::json;

use super::{expect_f64, expect_i64};

/// Accumulate Operator
///
/// `(int) -> int` and `(float) -> float`. Each input item produces one
/// output item: the sum of everything seen so far, the current item
/// included. Int overflow fails the node.
pub struct AccumulateOperator;

impl AccumulateOperator {
    pub const ID: &'static str = "accumulate";
}

impl OperatorDefinition for AccumulateOperator {
    fn descriptor() -> OperatorDescriptor {
        OperatorDescriptor::new(Self::ID, OperatorRole::Transform)
            .with_label("Accumulate")
            .with_description("Emits the running sum of its input")
            .with_operation(Operation::transform(
                "accumulate-int",
                Signature::unary(DataType::Int, DataType::Int),
                |input, _| {
                    Ok(input
                        .scan(0i64, |sum, item| {
                            let next = item.and_then(|item| {
                                let value = expect_i64(&item)?;
                                *sum = sum.checked_add(value).ok_or_else(|| {
                                    OperatorError::new(format!("running sum overflows at {}", value))
                                })?;
                                Ok(json!(*sum))
                            });
                            future::ready(Some(next))
                        })
                        .boxed())
                },
            ))
            .with_operation(Operation::transform(
                "accumulate-float",
                Signature::unary(DataType::Float, DataType::Float),
                |input, _| {
                    Ok(input
                        .scan(0f64, |sum, item| {
                            let next = item.and_then(|item| {
                                *sum += expect_f64(&item)?;
                                Ok(json!(*sum))
                            });
                            future::ready(Some(next))
                        })
                        .boxed())
                },
            ))
    }
}

inventory::submit!(node_compiler::OperatorFn(AccumulateOperator::descriptor));
