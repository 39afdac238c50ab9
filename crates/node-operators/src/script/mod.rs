//! Scripting operators
//!
//! Transforms whose behaviour is a rhai expression held in the node's
//! `expression` configuration. The upstream item is bound as `it`. The
//! compiler parses and types each expression when the graph is compiled,
//! so a broken expression never reaches a running pipeline.

use node_compiler::{OperatorDefinition, OperatorDescriptor, ScriptMode};

/// Expression Operator
///
/// Replaces each item with the value of the expression. The output type is
/// inferred from the expression, or taken from `outputType` when set.
pub struct ExpressionOperator;

impl ExpressionOperator {
    pub const ID: &'static str = "expression";
}

impl OperatorDefinition for ExpressionOperator {
    fn descriptor() -> OperatorDescriptor {
        OperatorDescriptor::script(Self::ID, ScriptMode::Map)
            .with_label("Expression")
            .with_description("Maps each item through an expression over `it`")
    }
}

inventory::submit!(node_compiler::OperatorFn(ExpressionOperator::descriptor));

/// Condition Operator
///
/// Keeps the items for which the expression is `true`. The expression must
/// produce a bool.
pub struct ConditionOperator;

impl ConditionOperator {
    pub const ID: &'static str = "condition";
}

impl OperatorDefinition for ConditionOperator {
    fn descriptor() -> OperatorDescriptor {
        OperatorDescriptor::script(Self::ID, ScriptMode::Filter)
            .with_label("Condition")
            .with_description("Keeps items for which an expression over `it` is true")
    }
}

inventory::submit!(node_compiler::OperatorFn(ConditionOperator::descriptor));
