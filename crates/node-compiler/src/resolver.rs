//! Type resolution
//!
//! Walks an analysed graph in activation order and computes each node's
//! concrete input tuple and output type. Errors are collected rather than
//! returned early; a node whose upstream failed is skipped, since its own
//! problems cannot be told apart from the upstream ones.

use std::sync::Arc;

use crate::descriptor::{OperatorDescriptor, Typing};
use crate::error::CompileError;
use crate::expression::{CompiledScript, ScriptEngine};
use crate::types::DataType;
use crate::validation::{Analysis, NodeShape};

/// Config key holding a scripting node's expression
pub const EXPRESSION_KEY: &str = "expression";
/// Config key declaring a scripting node's output type explicitly
pub const OUTPUT_TYPE_KEY: &str = "outputType";

/// Resolved types of one node
pub(crate) struct ResolvedNode {
    /// Full input tuple, in slot order (back edges included)
    pub inputs: Vec<DataType>,
    pub output: DataType,
    pub detail: ResolvedDetail,
}

pub(crate) enum ResolvedDetail {
    /// Operation selection happens in the node compiler
    Operator,
    Script(Arc<CompiledScript>),
    Subgraph(Box<Resolution>),
    Placeholder,
}

/// Resolved types of one graph level
pub(crate) struct Resolution {
    /// Indexed like the analysed graph's nodes; `None` when unresolved
    pub nodes: Vec<Option<ResolvedNode>>,
}

impl Resolution {
    pub fn output_of(&self, index: usize) -> Option<&DataType> {
        self.nodes[index].as_ref().map(|n| &n.output)
    }
}

/// Resolve a graph level, threading `external` types into its placeholders
pub(crate) fn resolve(
    analysis: &Analysis<'_>,
    external: &[DataType],
    engine: &ScriptEngine,
    errors: &mut Vec<CompileError>,
) -> Resolution {
    let mut resolution = Resolution {
        nodes: (0..analysis.graph.nodes.len()).map(|_| None).collect(),
    };

    for &index in &analysis.order {
        let forward: Option<Vec<DataType>> = analysis.inputs[index]
            .iter()
            .filter(|slot| !slot.back)
            .map(|slot| resolution.output_of(slot.from).cloned())
            .collect();
        let Some(forward) = forward else {
            log::debug!(
                "Skipping node '{}': an upstream node did not resolve",
                analysis.node_id(index)
            );
            continue;
        };

        if let Some(node) = resolve_node(analysis, index, forward, external, engine, errors) {
            resolution.nodes[index] = Some(node);
        }
    }

    close_feedback(analysis, &mut resolution, engine, errors);
    resolution
}

fn resolve_node(
    analysis: &Analysis<'_>,
    index: usize,
    inputs: Vec<DataType>,
    external: &[DataType],
    engine: &ScriptEngine,
    errors: &mut Vec<CompileError>,
) -> Option<ResolvedNode> {
    let node = &analysis.graph.nodes[index];

    match &analysis.shapes[index] {
        NodeShape::Operator(descriptor) if descriptor.script_mode().is_some() => {
            let script = compile_script(descriptor, node, &inputs, engine, errors)?;
            Some(ResolvedNode {
                output: script.output_type().clone(),
                inputs,
                detail: ResolvedDetail::Script(Arc::new(script)),
            })
        }
        NodeShape::Operator(descriptor) => match operator_output(descriptor, &inputs, &node.config) {
            Ok(output) => Some(ResolvedNode {
                inputs,
                output,
                detail: ResolvedDetail::Operator,
            }),
            Err(expected_shapes) => {
                errors.push(CompileError::TypeMismatch {
                    node_id: node.id.clone(),
                    expected_shapes,
                    actual_types: inputs,
                });
                None
            }
        },
        NodeShape::Subgraph(inner) => {
            let mut inner_errors = Vec::new();
            let nested = resolve(inner, &inputs, engine, &mut inner_errors);
            errors.extend(inner_errors.into_iter().map(|e| e.nested_in(&node.id)));
            let output = inner.output.and_then(|o| nested.output_of(o)).cloned()?;
            Some(ResolvedNode {
                inputs,
                output,
                detail: ResolvedDetail::Subgraph(Box::new(nested)),
            })
        }
        NodeShape::Input(position) => Some(ResolvedNode {
            output: external.get(*position).cloned()?,
            inputs,
            detail: ResolvedDetail::Placeholder,
        }),
        NodeShape::Output => Some(ResolvedNode {
            output: inputs.first().cloned()?,
            inputs,
            detail: ResolvedDetail::Placeholder,
        }),
    }
}

/// Output type of an operator for the given inputs
///
/// On failure returns the shapes the operator accepts, for the report.
fn operator_output(
    descriptor: &OperatorDescriptor,
    inputs: &[DataType],
    config: &crate::graph::NodeConfig,
) -> Result<DataType, Vec<String>> {
    match &descriptor.typing {
        Typing::Custom(typing) => typing(inputs, config).map_err(|message| vec![message]),
        Typing::Derived => descriptor
            .operations()
            .iter()
            .filter_map(|op| op.signature.bind(inputs))
            .min_by_key(|binding| binding.cost)
            .map(|binding| binding.output)
            .ok_or_else(|| descriptor.expected_shapes()),
    }
}

fn compile_script(
    descriptor: &OperatorDescriptor,
    node: &crate::graph::GraphNode,
    inputs: &[DataType],
    engine: &ScriptEngine,
    errors: &mut Vec<CompileError>,
) -> Option<CompiledScript> {
    let mode = descriptor.script_mode()?;
    let fail = |message: String| CompileError::ExpressionCompilation {
        node_id: node.id.clone(),
        message,
    };

    let source = node.config.get_str(EXPRESSION_KEY).unwrap_or("it");
    let declared = match node.config.get_str(OUTPUT_TYPE_KEY).map(str::parse::<DataType>) {
        None => None,
        Some(Ok(ty)) => Some(ty),
        Some(Err(e)) => {
            errors.push(fail(e.to_string()));
            return None;
        }
    };
    let input = inputs.first()?;

    match engine.compile(source, mode, input, declared.as_ref()) {
        Ok(script) => Some(script),
        Err(message) => {
            errors.push(fail(message));
            None
        }
    }
}

/// Re-resolve feedback nodes with their full input tuple
///
/// The output computed from forward inputs alone must be a fixpoint.
fn close_feedback(
    analysis: &Analysis<'_>,
    resolution: &mut Resolution,
    engine: &ScriptEngine,
    errors: &mut Vec<CompileError>,
) {
    for &index in &analysis.order {
        let slots = &analysis.inputs[index];
        if !slots.iter().any(|slot| slot.back) {
            continue;
        }
        let Some(forward_output) = resolution.output_of(index).cloned() else {
            continue;
        };
        let full: Option<Vec<DataType>> = slots
            .iter()
            .map(|slot| resolution.output_of(slot.from).cloned())
            .collect();
        let Some(full) = full else {
            continue;
        };

        let node = &analysis.graph.nodes[index];
        let mut node_errors = Vec::new();
        match resolve_node(analysis, index, full.clone(), &[], engine, &mut node_errors) {
            Some(resolved) if resolved.output == forward_output => {
                resolution.nodes[index] = Some(resolved);
            }
            Some(_) | None => {
                let expected_shapes = match &analysis.shapes[index] {
                    NodeShape::Operator(descriptor) => descriptor.expected_shapes(),
                    _ => Vec::new(),
                };
                errors.push(CompileError::TypeMismatch {
                    node_id: node.id.clone(),
                    expected_shapes,
                    actual_types: full,
                });
                resolution.nodes[index] = None;
            }
        }
    }
}
