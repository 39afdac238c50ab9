//! IR fragments and the folded pipeline plan
//!
//! A [`Fragment`] is the compiled, not-yet-linked form of one node: which
//! operation or script runs, the resolved types, and where its inputs come
//! from. A [`PipelinePlan`] holds the fragments of one graph level in
//! activation order together with the consumer lists used to wire fan-out.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::descriptor::Operation;
use crate::expression::CompiledScript;
use crate::graph::NodeConfig;
use crate::types::DataType;

/// Where one input of a step comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InputRef {
    /// Producing step
    pub step: usize,
    /// Feedback edge, delivered through an unbounded channel
    pub back: bool,
}

/// One consumer of a step's output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Consumer {
    pub step: usize,
    /// Input slot on the consuming step
    pub slot: usize,
    pub back: bool,
}

pub(crate) enum FragmentKind {
    /// A selected native operation
    Operation { operator_id: String, operation: Operation },
    Script { operator_id: String, script: Arc<CompiledScript> },
    Subgraph(Arc<PipelinePlan>),
    /// Yields the composite's external input at this position
    Input(usize),
    /// Passes its input out of the composite
    Output,
}

/// The compiled form of one node
pub(crate) struct Fragment {
    /// Attributed id (`outer/inner` inside sub-graphs)
    pub path: String,
    pub config: Arc<NodeConfig>,
    pub inputs: Vec<InputRef>,
    pub input_types: Vec<DataType>,
    pub output_type: DataType,
    pub kind: FragmentKind,
}

impl Fragment {
    pub fn has_back_inputs(&self) -> bool {
        self.inputs.iter().any(|i| i.back)
    }

    pub fn is_source(&self) -> bool {
        matches!(
            &self.kind,
            FragmentKind::Operation { operation, .. }
                if matches!(operation.body, crate::descriptor::OperationBody::Source(_))
        )
    }
}

/// Fragments of one graph level, folded in activation order
pub(crate) struct PipelinePlan {
    pub graph_id: String,
    pub steps: Vec<Fragment>,
    /// Per step, in (consumer step, slot) order
    pub consumers: Vec<Vec<Consumer>>,
    /// Step holding the `Output` placeholder of a composite
    pub output: Option<usize>,
}

impl PipelinePlan {
    pub fn new(graph_id: impl Into<String>, steps: Vec<Fragment>, output: Option<usize>) -> Self {
        let mut consumers: Vec<Vec<Consumer>> = vec![Vec::new(); steps.len()];
        for (step, fragment) in steps.iter().enumerate() {
            for (slot, input) in fragment.inputs.iter().enumerate() {
                consumers[input.step].push(Consumer {
                    step,
                    slot,
                    back: input.back,
                });
            }
        }
        Self {
            graph_id: graph_id.into(),
            steps,
            consumers,
            output,
        }
    }

    /// Total number of steps, nested plans included
    pub fn node_count(&self) -> usize {
        self.steps
            .iter()
            .map(|f| match &f.kind {
                FragmentKind::Subgraph(plan) => 1 + plan.node_count(),
                _ => 1,
            })
            .sum()
    }

    /// Deterministic textual rendering of the plan
    pub fn describe(&self) -> String {
        let mut out = String::new();
        self.describe_into(&mut out, 0);
        out
    }

    fn describe_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        let _ = writeln!(out, "{}plan '{}' ({} steps)", indent, self.graph_id, self.steps.len());
        for (index, fragment) in self.steps.iter().enumerate() {
            let kind = match &fragment.kind {
                FragmentKind::Operation {
                    operator_id,
                    operation,
                } => format!("{}::{}", operator_id, operation.name),
                FragmentKind::Script {
                    operator_id,
                    script,
                } => format!("{} `{}`", operator_id, script.source()),
                FragmentKind::Subgraph(_) => "subgraph".to_string(),
                FragmentKind::Input(position) => format!("input #{}", position),
                FragmentKind::Output => "output".to_string(),
            };
            let types: Vec<String> = fragment.input_types.iter().map(|t| t.to_string()).collect();
            let sources: Vec<String> = fragment
                .inputs
                .iter()
                .map(|i| if i.back { format!("{}~", i.step) } else { i.step.to_string() })
                .collect();
            let _ = write!(
                out,
                "{}  [{}] {}: {} ({}) -> {}",
                indent,
                index,
                fragment.path,
                kind,
                types.join(", "),
                fragment.output_type
            );
            if !sources.is_empty() {
                let _ = write!(out, " <- [{}]", sources.join(", "));
            }
            out.push('\n');
            if let FragmentKind::Subgraph(plan) = &fragment.kind {
                plan.describe_into(out, depth + 2);
            }
        }
    }
}
