//! Values Operator
//!
//! Emits a literal list of items taken from the node configuration.

use futures::{stream, StreamExt};
use node_compiler::{
    DataType, NodeConfig, Operation, OperatorDefinition, OperatorDescriptor, OperatorRole,
    Signature,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Configuration for the values operator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValuesConfig {
    /// Items emitted in order
    pub items: Vec<Value>,
    /// Declared item type; inferred from `items` when absent
    pub item_type: Option<String>,
}

/// Values Operator
///
/// Emits `items` in order and completes. The output type is the declared
/// `itemType`, or the narrowest of `int`, `float`, `bool`, `text` that
/// admits every item, falling back to `json`.
pub struct ValuesOperator;

impl ValuesOperator {
    pub const ID: &'static str = "values";
}

/// Output type of a values node, checked against its items
fn item_type(config: &NodeConfig) -> Result<DataType, String> {
    let config: ValuesConfig = config.decode().map_err(|e| e.to_string())?;

    let Some(declared) = config.item_type.as_deref() else {
        return Ok(infer_item_type(&config.items));
    };
    let declared: DataType = declared.parse().map_err(|e| format!("itemType: {}", e))?;
    match config.items.iter().position(|item| !declared.admits(item)) {
        Some(index) => Err(format!(
            "item {} ({}) is not a {}",
            index, config.items[index], declared
        )),
        None => Ok(declared),
    }
}

fn infer_item_type(items: &[Value]) -> DataType {
    [DataType::Int, DataType::Float, DataType::Bool, DataType::Text]
        .into_iter()
        .find(|candidate| !items.is_empty() && items.iter().all(|item| candidate.admits(item)))
        .unwrap_or(DataType::Json)
}

impl OperatorDefinition for ValuesOperator {
    fn descriptor() -> OperatorDescriptor {
        OperatorDescriptor::new(Self::ID, OperatorRole::Source)
            .with_label("Values")
            .with_description("Emits a literal list of items")
            .with_typing(|_, config| item_type(config))
            .with_operation(Operation::source(
                "values",
                Signature::source(DataType::Json),
                |ctx| {
                    let config: ValuesConfig = crate::read_config(ctx.config(), Self::ID)?;
                    log::debug!(
                        "ValuesOperator {}: emitting {} items",
                        ctx.node_id(),
                        config.items.len()
                    );
                    Ok(stream::iter(config.items.into_iter().map(Ok)).boxed())
                },
            ))
    }
}

inventory::submit!(node_compiler::OperatorFn(ValuesOperator::descriptor));

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{compile, run};
    use node_compiler::{CompileError, Graph};
    use serde_json::json;

    fn config(items: Value, item_type: Option<&str>) -> NodeConfig {
        let mut config = NodeConfig::default();
        config.set("items", items);
        if let Some(ty) = item_type {
            config.set("itemType", json!(ty));
        }
        config
    }

    #[test]
    fn test_inferred_types() {
        assert_eq!(item_type(&config(json!([1, 2]), None)), Ok(DataType::Int));
        assert_eq!(item_type(&config(json!([1, 2.5]), None)), Ok(DataType::Float));
        assert_eq!(item_type(&config(json!(["a"]), None)), Ok(DataType::Text));
        assert_eq!(item_type(&config(json!([true, false]), None)), Ok(DataType::Bool));
        assert_eq!(item_type(&config(json!([1, "a"]), None)), Ok(DataType::Json));
        assert_eq!(item_type(&config(json!([]), None)), Ok(DataType::Json));
    }

    #[test]
    fn test_declared_type_checks_items() {
        assert_eq!(
            item_type(&config(json!([[1, "a"]]), Some("(int, text)"))),
            Ok(DataType::tuple([DataType::Int, DataType::Text]))
        );
        let err = item_type(&config(json!([1, "two"]), Some("int"))).unwrap_err();
        assert_eq!(err, "item 1 (\"two\") is not a int");
        assert!(item_type(&config(json!([1]), Some("integer"))).is_err());
    }

    #[test]
    fn test_mistyped_items_fail_compilation() {
        let mut graph = Graph::new("g", "G");
        graph.add_operator("src", "values").config = config(json!(["x"]), Some("int"));
        graph.add_operator("sink", "collect");
        graph.connect("src", "sink");

        let err = compile(&graph).unwrap_err();
        assert!(matches!(
            &err.errors()[0],
            CompileError::TypeMismatch { node_id, .. } if node_id == "src"
        ));
    }

    #[tokio::test]
    async fn test_emits_items_in_order() {
        let mut graph = Graph::new("g", "G");
        graph.add_operator("src", "values").config = config(json!(["b", "a", "c"]), None);
        graph.add_operator("sink", "collect");
        graph.connect("src", "sink");

        let (outcome, items) = run(&graph).await;
        assert!(outcome.is_ok());
        assert_eq!(items, vec![json!("b"), json!("a"), json!("c")]);
    }
}
