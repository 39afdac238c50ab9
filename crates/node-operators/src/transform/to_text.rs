//! To-Text Operator
//!
//! Renders any item as text.

use node_compiler::{
    DataType, Item, Operation, OperatorDefinition, OperatorDescriptor, OperatorRole, Signature,
    TypePattern,
};
use serde_json::Value;

/// To-Text Operator
///
/// `(T) -> text`. Strings pass through unquoted; everything else is
/// rendered as compact JSON.
pub struct ToTextOperator;

impl ToTextOperator {
    pub const ID: &'static str = "to-text";
}

fn render(item: Item) -> Item {
    match item {
        Value::String(_) => item,
        other => Value::String(other.to_string()),
    }
}

impl OperatorDefinition for ToTextOperator {
    fn descriptor() -> OperatorDescriptor {
        OperatorDescriptor::new(Self::ID, OperatorRole::Transform)
            .with_label("To Text")
            .with_description("Converts each item to its text form")
            .with_operation(Operation::map(
                "to-text",
                Signature::unary(TypePattern::Var("T"), DataType::Text),
                |item, _| Ok(render(item)),
            ))
    }
}

inventory::submit!(node_compiler::OperatorFn(ToTextOperator::descriptor));

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{compile, linear, run};
    use serde_json::json;

    #[test]
    fn test_render() {
        assert_eq!(render(json!("plain")), json!("plain"));
        assert_eq!(render(json!(3)), json!("3"));
        assert_eq!(render(json!(1.5)), json!("1.5"));
        assert_eq!(render(json!([1, "a"])), json!("[1,\"a\"]"));
        assert_eq!(render(Value::Null), json!("null"));
    }

    #[test]
    fn test_output_is_text() {
        let graph = linear("range", "to-text");
        let described = compile(&graph).unwrap().describe();
        assert!(described.contains("to-text::to-text (int) -> text"), "{}", described);
    }

    #[tokio::test]
    async fn test_converts_items() {
        let mut graph = linear("range", "to-text");
        graph.set_config("src", "start", json!(8));
        graph.set_config("src", "count", json!(3));
        let (outcome, items) = run(&graph).await;
        assert!(outcome.is_ok());
        assert_eq!(items, vec![json!("8"), json!("9"), json!("10")]);
    }
}
