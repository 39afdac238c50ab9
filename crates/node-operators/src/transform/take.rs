//! Take Operator
//!
//! Passes the first `count` items through, then completes.

use futures::StreamExt;
use node_compiler::{Operation, OperatorDefinition, OperatorDescriptor, OperatorRole};
use serde::{Deserialize, Serialize};

use super::passthrough;

/// Configuration for the take operator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TakeConfig {
    /// Number of items passed before completing
    pub count: u64,
}

/// Take Operator
///
/// Completing early drops the upstream subscription, so an unbounded
/// source feeding only this node winds down with it.
pub struct TakeOperator;

impl TakeOperator {
    pub const ID: &'static str = "take";
}

impl OperatorDefinition for TakeOperator {
    fn descriptor() -> OperatorDescriptor {
        OperatorDescriptor::new(Self::ID, OperatorRole::Transform)
            .with_label("Take")
            .with_description("Passes the first `count` items, then completes")
            .with_operation(Operation::transform("take", passthrough(), |input, ctx| {
                let config: TakeConfig = crate::read_config(ctx.config(), Self::ID)?;
                log::debug!("TakeOperator {}: taking {} items", ctx.node_id(), config.count);
                Ok(input.take(config.count as usize).boxed())
            }))
    }
}

inventory::submit!(node_compiler::OperatorFn(TakeOperator::descriptor));
