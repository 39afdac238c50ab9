//! Merge Operator
//!
//! Interleaves any number of same-typed inputs into one stream.

use futures::stream::{self, StreamExt};
use node_compiler::{
    Operation, OperatorDefinition, OperatorDescriptor, OperatorRole, Signature, TypePattern,
};

/// Merge Operator
///
/// `(T, T, ...) -> T`. Every edge into port 0 is one more input. Items are
/// forwarded as they arrive; the output completes once every input has.
pub struct MergeOperator;

impl MergeOperator {
    pub const ID: &'static str = "merge";
}

impl OperatorDefinition for MergeOperator {
    fn descriptor() -> OperatorDescriptor {
        OperatorDescriptor::new(Self::ID, OperatorRole::Combinator)
            .with_label("Merge")
            .with_description("Interleaves items from all inputs as they arrive")
            .with_operation(Operation::combinator(
                "merge",
                Signature::variadic(TypePattern::Var("T"), 1, TypePattern::Var("T")),
                |inputs, ctx| {
                    log::debug!("MergeOperator {}: merging {} inputs", ctx.node_id(), inputs.len());
                    Ok(stream::select_all(inputs).boxed())
                },
            ))
    }
}

inventory::submit!(node_compiler::OperatorFn(MergeOperator::descriptor));

#[cfg(test)]
mod tests {
    use crate::testing::{compile, run};
    use node_compiler::{CompileError, Graph};
    use serde_json::json;

    fn merge_graph(second: &str) -> Graph {
        let mut graph = Graph::new("g", "G");
        let a = graph.add_operator("a", "range");
        a.config.set("count", json!(3));
        let b = graph.add_operator("b", second);
        b.config.set("start", json!(100));
        b.config.set("count", json!(3));
        b.config.set("items", json!(["x"]));
        graph.add_operator("m", "merge");
        graph.add_operator("sink", "collect");
        graph.connect("a", "m");
        graph.connect("b", "m");
        graph.connect("m", "sink");
        graph
    }

    #[tokio::test]
    async fn test_merges_all_items_keeping_per_input_order() {
        let (outcome, items) = run(&merge_graph("range")).await;
        assert!(outcome.is_ok());

        let values: Vec<i64> = items.iter().filter_map(|v| v.as_i64()).collect();
        assert_eq!(values.len(), 6);
        let low: Vec<i64> = values.iter().copied().filter(|v| *v < 100).collect();
        let high: Vec<i64> = values.iter().copied().filter(|v| *v >= 100).collect();
        assert_eq!(low, vec![0, 1, 2]);
        assert_eq!(high, vec![100, 101, 102]);
    }

    #[test]
    fn test_inputs_must_agree() {
        let err = compile(&merge_graph("values")).unwrap_err();
        assert!(matches!(
            &err.errors()[0],
            CompileError::TypeMismatch { node_id, .. } if node_id == "m"
        ));
    }
}
