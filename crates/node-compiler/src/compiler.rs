//! Node compiler
//!
//! Turns each resolved node into a [`Fragment`] and folds a graph level
//! into a [`PipelinePlan`]. Operator nodes get the operation whose
//! signature binds their input tuple most cheaply; sub-graphs are compiled
//! recursively into nested plans.

use std::sync::Arc;

use crate::descriptor::{Operation, OperatorDescriptor};
use crate::error::CompileError;
use crate::fragment::{Fragment, FragmentKind, InputRef, PipelinePlan};
use crate::resolver::{ResolvedDetail, Resolution};
use crate::types::DataType;
use crate::validation::{Analysis, NodeShape};

/// Pick the operation of `descriptor` that best fits `inputs`
///
/// Candidates are ranked by binding cost. A tie for the lowest cost is
/// ambiguous.
pub(crate) fn select_operation(
    node_id: &str,
    descriptor: &OperatorDescriptor,
    inputs: &[DataType],
) -> Result<Operation, CompileError> {
    let mut ranked: Vec<(u32, &Operation)> = descriptor
        .operations()
        .iter()
        .filter_map(|op| op.signature.bind(inputs).map(|binding| (binding.cost, op)))
        .collect();
    ranked.sort_by_key(|(cost, _)| *cost);

    let Some(&(best, operation)) = ranked.first() else {
        return Err(CompileError::NoMatchingOperation {
            node_id: node_id.to_string(),
            actual_types: inputs.to_vec(),
        });
    };

    let tied: Vec<String> = ranked
        .iter()
        .take_while(|(cost, _)| *cost == best)
        .map(|(_, op)| op.name.clone())
        .collect();
    if tied.len() > 1 {
        return Err(CompileError::AmbiguousOperation {
            node_id: node_id.to_string(),
            candidates: tied,
        });
    }

    log::trace!(
        "Node '{}' uses operation '{}' {} (cost {})",
        node_id,
        operation.name,
        operation.signature,
        best
    );
    Ok(operation.clone())
}

/// Compile one resolved graph level into a plan
///
/// `prefix` is the path of the enclosing composite node, if any. Returns
/// `None` when any node of the level (or a nested level) failed; the
/// failures are appended to `errors`.
pub(crate) fn compile_plan(
    analysis: &Analysis<'_>,
    resolution: &Resolution,
    prefix: Option<&str>,
    errors: &mut Vec<CompileError>,
) -> Option<PipelinePlan> {
    let mut step_of = vec![0; analysis.graph.nodes.len()];
    for (step, &index) in analysis.order.iter().enumerate() {
        step_of[index] = step;
    }

    let error_count = errors.len();
    let mut steps = Vec::with_capacity(analysis.order.len());

    for &index in &analysis.order {
        let node = &analysis.graph.nodes[index];
        let Some(resolved) = resolution.nodes[index].as_ref() else {
            continue;
        };
        let path = match prefix {
            Some(prefix) => format!("{}/{}", prefix, node.id),
            None => node.id.clone(),
        };

        let kind = match (&analysis.shapes[index], &resolved.detail) {
            (NodeShape::Operator(descriptor), ResolvedDetail::Script(script)) => FragmentKind::Script {
                operator_id: descriptor.id.clone(),
                script: script.clone(),
            },
            (NodeShape::Operator(descriptor), _) => {
                match select_operation(&node.id, descriptor, &resolved.inputs) {
                    Ok(operation) => FragmentKind::Operation {
                        operator_id: descriptor.id.clone(),
                        operation,
                    },
                    Err(e) => {
                        errors.push(e);
                        continue;
                    }
                }
            }
            (NodeShape::Subgraph(inner), ResolvedDetail::Subgraph(nested)) => {
                let mut inner_errors = Vec::new();
                let plan = compile_plan(inner, nested, Some(&path), &mut inner_errors);
                errors.extend(inner_errors.into_iter().map(|e| e.nested_in(&node.id)));
                match plan {
                    Some(plan) => FragmentKind::Subgraph(Arc::new(plan)),
                    None => continue,
                }
            }
            (NodeShape::Subgraph(_), _) => continue,
            (NodeShape::Input(position), _) => FragmentKind::Input(*position),
            (NodeShape::Output, _) => FragmentKind::Output,
        };

        steps.push(Fragment {
            path,
            config: Arc::new(node.config.clone()),
            inputs: analysis.inputs[index]
                .iter()
                .map(|slot| InputRef {
                    step: step_of[slot.from],
                    back: slot.back,
                })
                .collect(),
            input_types: resolved.inputs.clone(),
            output_type: resolved.output.clone(),
            kind,
        });
    }

    // A skipped node means an error was recorded here or during resolution
    if errors.len() > error_count || steps.len() != analysis.order.len() {
        return None;
    }

    Some(PipelinePlan::new(
        analysis.graph.id.clone(),
        steps,
        analysis.output.map(|o| step_of[o]),
    ))
}
