//! Skip Operator
//!
//! Drops the first `count` items and passes the rest through.

use futures::StreamExt;
use node_compiler::{Operation, OperatorDefinition, OperatorDescriptor, OperatorRole};
use serde::{Deserialize, Serialize};

use super::passthrough;

/// Configuration for the skip operator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SkipConfig {
    /// Number of leading items to drop
    pub count: u64,
}

pub struct SkipOperator;

impl SkipOperator {
    pub const ID: &'static str = "skip";
}

impl OperatorDefinition for SkipOperator {
    fn descriptor() -> OperatorDescriptor {
        OperatorDescriptor::new(Self::ID, OperatorRole::Transform)
            .with_label("Skip")
            .with_description("Drops the first `count` items")
            .with_operation(Operation::transform("skip", passthrough(), |input, ctx| {
                let config: SkipConfig = crate::read_config(ctx.config(), Self::ID)?;
                Ok(input.skip(config.count as usize).boxed())
            }))
    }
}

inventory::submit!(node_compiler::OperatorFn(SkipOperator::descriptor));

#[cfg(test)]
mod tests {
    use crate::testing::{linear, run};
    use serde_json::json;

    #[tokio::test]
    async fn test_skips_leading_items() {
        let mut graph = linear("range", "skip");
        graph.set_config("src", "count", json!(5));
        graph.set_config("op", "count", json!(3));

        let (outcome, items) = run(&graph).await;
        assert!(outcome.is_ok());
        assert_eq!(items, vec![json!(3), json!(4)]);
    }

    #[tokio::test]
    async fn test_skipping_everything() {
        let mut graph = linear("range", "skip");
        graph.set_config("src", "count", json!(2));
        graph.set_config("op", "count", json!(10));

        let (outcome, items) = run(&graph).await;
        assert!(outcome.is_ok());
        assert!(items.is_empty());
    }
}
