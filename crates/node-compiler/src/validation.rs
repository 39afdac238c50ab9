//! Structural validation and scheduling
//!
//! Checks node and edge references, port usage, placeholders and feedback
//! declarations, then orders the graph topologically. Every structural
//! error of one graph (and its sub-graphs) is reported together; any of
//! them is fatal to the compile attempt.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use crate::descriptor::{OperatorDescriptor, OperatorRole};
use crate::error::{CompileError, GraphCompilationError};
use crate::graph::{Graph, NodeId, NodeKind};
use crate::registry::OperatorRegistry;

/// What a node resolved to during analysis
pub(crate) enum NodeShape<'g> {
    Operator(Arc<OperatorDescriptor>),
    Subgraph(Box<Analysis<'g>>),
    Input(usize),
    Output,
}

/// One connected input of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InputSlot {
    /// Index of the producing node
    pub from: usize,
    pub port: usize,
    /// Closes a cycle through a feedback node
    pub back: bool,
}

/// A structurally valid graph, indexed for resolution and emission
pub(crate) struct Analysis<'g> {
    pub graph: &'g Graph,
    pub shapes: Vec<NodeShape<'g>>,
    /// Per node, ordered by (port, edge declaration order)
    pub inputs: Vec<Vec<InputSlot>>,
    /// Node indexes in activation order
    pub order: Vec<usize>,
    /// Number of `Input` placeholders
    pub placeholders: usize,
    /// Index of the `Output` placeholder, if any
    pub output: Option<usize>,
}

impl<'g> Analysis<'g> {
    pub fn node_id(&self, index: usize) -> &'g str {
        &self.graph.nodes[index].id
    }

    /// Node ids in activation order
    pub fn order_ids(&self) -> Vec<NodeId> {
        self.order.iter().map(|&i| self.node_id(i).to_string()).collect()
    }
}

/// Validate a graph's structure
///
/// Returns all errors found (not just the first).
pub fn validate_graph(graph: &Graph, registry: &OperatorRegistry) -> Vec<CompileError> {
    match analyze(graph, registry) {
        Ok(_) => Vec::new(),
        Err(errors) => errors,
    }
}

/// Deterministic topological order of a graph's node ids
///
/// Ties are broken by node declaration order; back edges into feedback
/// nodes do not constrain the order.
pub fn topological_order(
    graph: &Graph,
    registry: &OperatorRegistry,
) -> Result<Vec<NodeId>, GraphCompilationError> {
    analyze(graph, registry)
        .map(|analysis| analysis.order_ids())
        .map_err(GraphCompilationError::new)
}

pub(crate) fn analyze<'g>(
    graph: &'g Graph,
    registry: &OperatorRegistry,
) -> Result<Analysis<'g>, Vec<CompileError>> {
    analyze_level(graph, registry, false)
}

fn analyze_level<'g>(
    graph: &'g Graph,
    registry: &OperatorRegistry,
    nested: bool,
) -> Result<Analysis<'g>, Vec<CompileError>> {
    let mut errors = Vec::new();

    let index = index_nodes(graph, &mut errors);
    let shapes = resolve_shapes(graph, registry, nested, &mut errors);
    let ports: Vec<Option<usize>> = shapes.iter().map(|s| s.as_ref().map(port_count)).collect();

    let inputs = collect_inputs(graph, &index, &ports, &mut errors);
    validate_port_usage(graph, &shapes, &ports, &inputs, &mut errors);
    let (placeholders, output) = validate_placeholders(graph, &inputs, nested, &mut errors);

    let mut inputs = inputs;
    mark_back_edges(graph, &mut inputs, &mut errors);
    let order = schedule(graph, &inputs, &mut errors);

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(Analysis {
        graph,
        // Every shape resolved, otherwise an error was recorded above
        shapes: shapes.into_iter().flatten().collect(),
        inputs,
        order,
        placeholders,
        output,
    })
}

fn port_count(shape: &NodeShape<'_>) -> usize {
    match shape {
        NodeShape::Operator(descriptor) => descriptor.input_ports,
        NodeShape::Subgraph(inner) => inner.placeholders,
        NodeShape::Input(_) => 0,
        NodeShape::Output => 1,
    }
}

fn accepts_many(shape: Option<&NodeShape<'_>>) -> bool {
    matches!(shape, Some(NodeShape::Operator(d)) if d.role == OperatorRole::Combinator)
}

/// Map node ids to their first declaration
fn index_nodes<'g>(graph: &'g Graph, errors: &mut Vec<CompileError>) -> HashMap<&'g str, usize> {
    let mut index = HashMap::new();
    for (i, node) in graph.nodes.iter().enumerate() {
        if index.insert(node.id.as_str(), i).is_some() {
            errors.push(CompileError::DuplicateNode {
                node_id: node.id.clone(),
            });
        }
    }
    // Keep the first declaration
    for (i, node) in graph.nodes.iter().enumerate().rev() {
        index.insert(node.id.as_str(), i);
    }
    index
}

fn resolve_shapes<'g>(
    graph: &'g Graph,
    registry: &OperatorRegistry,
    nested: bool,
    errors: &mut Vec<CompileError>,
) -> Vec<Option<NodeShape<'g>>> {
    graph
        .nodes
        .iter()
        .map(|node| match &node.kind {
            NodeKind::Operator { operator_id } => match registry.lookup(operator_id) {
                Ok(descriptor) => Some(NodeShape::Operator(descriptor)),
                Err(_) => {
                    errors.push(CompileError::UnknownOperator {
                        node_id: node.id.clone(),
                        operator_id: operator_id.clone(),
                    });
                    None
                }
            },
            NodeKind::Subgraph { graph: inner } => {
                match analyze_level(inner, registry, true) {
                    Ok(analysis) if analysis.output.is_none() => {
                        errors.push(CompileError::InvalidPlaceholder {
                            node_id: node.id.clone(),
                            message: "sub-graph declares no Output placeholder".to_string(),
                        });
                        None
                    }
                    Ok(analysis) => Some(NodeShape::Subgraph(Box::new(analysis))),
                    Err(inner_errors) => {
                        errors.extend(inner_errors.into_iter().map(|e| e.nested_in(&node.id)));
                        None
                    }
                }
            }
            NodeKind::Input { .. } | NodeKind::Output if !nested => {
                errors.push(CompileError::InvalidPlaceholder {
                    node_id: node.id.clone(),
                    message: "placeholders are only valid inside sub-graphs".to_string(),
                });
                None
            }
            NodeKind::Input { position } => Some(NodeShape::Input(*position)),
            NodeKind::Output => Some(NodeShape::Output),
        })
        .collect()
}

/// Check edge references and ports, grouping edges by target node
fn collect_inputs(
    graph: &Graph,
    index: &HashMap<&str, usize>,
    ports: &[Option<usize>],
    errors: &mut Vec<CompileError>,
) -> Vec<Vec<InputSlot>> {
    let mut inputs: Vec<Vec<(usize, InputSlot)>> = vec![Vec::new(); graph.nodes.len()];

    for (edge_index, edge) in graph.edges.iter().enumerate() {
        let from = index.get(edge.from_node.as_str()).copied();
        let to = index.get(edge.to_node.as_str()).copied();

        for (endpoint, id) in [(from, &edge.from_node), (to, &edge.to_node)] {
            if endpoint.is_none() {
                errors.push(CompileError::UnknownNode {
                    edge_index,
                    node_id: id.clone(),
                });
            }
        }
        let (Some(from), Some(to)) = (from, to) else {
            continue;
        };

        if edge.from_port != 0 {
            errors.push(CompileError::InvalidPort {
                node_id: edge.from_node.clone(),
                port: edge.from_port,
                message: "nodes expose a single output port 0".to_string(),
            });
            continue;
        }
        // Unknown port counts belong to nodes that already failed
        let Some(count) = ports[to] else {
            continue;
        };
        if edge.to_port >= count {
            errors.push(CompileError::InvalidPort {
                node_id: edge.to_node.clone(),
                port: edge.to_port,
                message: format!("node declares {} input port(s)", count),
            });
            continue;
        }

        inputs[to].push((
            edge_index,
            InputSlot {
                from,
                port: edge.to_port,
                back: false,
            },
        ));
    }

    inputs
        .into_iter()
        .map(|mut slots| {
            slots.sort_by_key(|(edge_index, slot)| (slot.port, *edge_index));
            slots.into_iter().map(|(_, slot)| slot).collect()
        })
        .collect()
}

fn validate_port_usage(
    graph: &Graph,
    shapes: &[Option<NodeShape<'_>>],
    ports: &[Option<usize>],
    inputs: &[Vec<InputSlot>],
    errors: &mut Vec<CompileError>,
) {
    for (i, node) in graph.nodes.iter().enumerate() {
        let Some(count) = ports[i] else {
            continue;
        };

        let mut per_port = vec![0usize; count];
        for slot in &inputs[i] {
            per_port[slot.port] += 1;
        }

        let missing: Vec<usize> = (0..count).filter(|&p| per_port[p] == 0).collect();
        if !missing.is_empty() {
            errors.push(CompileError::IncompleteGraph {
                node_id: node.id.clone(),
                ports: missing,
            });
        }

        if !accepts_many(shapes[i].as_ref()) {
            for (port, &edges) in per_port.iter().enumerate() {
                if edges > 1 {
                    errors.push(CompileError::PortOverConnected {
                        node_id: node.id.clone(),
                        port,
                        edges,
                    });
                }
            }
        }

        if node.feedback && !accepts_many(shapes[i].as_ref()) && shapes[i].is_some() {
            errors.push(CompileError::InvalidFeedback {
                node_id: node.id.clone(),
                message: "only combinator nodes may declare feedback".to_string(),
            });
        }
    }
}

/// Returns the placeholder count and the `Output` node index
fn validate_placeholders(
    graph: &Graph,
    inputs: &[Vec<InputSlot>],
    nested: bool,
    errors: &mut Vec<CompileError>,
) -> (usize, Option<usize>) {
    if !nested {
        return (0, None);
    }

    let mut positions: Vec<(usize, &str)> = Vec::new();
    let mut output = None;
    for (i, node) in graph.nodes.iter().enumerate() {
        match node.kind {
            NodeKind::Input { position } => positions.push((position, &node.id)),
            NodeKind::Output => {
                if output.is_some() {
                    errors.push(CompileError::InvalidPlaceholder {
                        node_id: node.id.clone(),
                        message: "a sub-graph has exactly one Output placeholder".to_string(),
                    });
                } else {
                    output = Some(i);
                }
                let consumed = inputs.iter().flatten().any(|slot| slot.from == i);
                if consumed {
                    errors.push(CompileError::InvalidPlaceholder {
                        node_id: node.id.clone(),
                        message: "the Output placeholder cannot feed other nodes".to_string(),
                    });
                }
            }
            _ => {}
        }
    }

    positions.sort();
    for (expected, (position, id)) in positions.iter().enumerate() {
        if *position != expected {
            errors.push(CompileError::InvalidPlaceholder {
                node_id: id.to_string(),
                message: format!(
                    "input positions must be unique and contiguous from 0 (expected {}, found {})",
                    expected, position
                ),
            });
            break;
        }
    }

    (positions.len(), output)
}

/// Mark edges closing a cycle through a feedback node
///
/// An edge `u -> f` into a feedback node `f` is a back edge when `u` is
/// reachable from `f`.
fn mark_back_edges(graph: &Graph, inputs: &mut [Vec<InputSlot>], errors: &mut Vec<CompileError>) {
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); graph.nodes.len()];
    for (to, slots) in inputs.iter().enumerate() {
        for slot in slots {
            successors[slot.from].push(to);
        }
    }

    for (f, node) in graph.nodes.iter().enumerate() {
        if !node.feedback {
            continue;
        }

        let mut reachable = HashSet::new();
        let mut stack = vec![f];
        while let Some(n) = stack.pop() {
            for &next in &successors[n] {
                if reachable.insert(next) {
                    stack.push(next);
                }
            }
        }

        for slot in inputs[f].iter_mut() {
            slot.back = slot.from == f || reachable.contains(&slot.from);
        }

        if !inputs[f].is_empty() && inputs[f].iter().all(|slot| slot.back) {
            errors.push(CompileError::InvalidFeedback {
                node_id: node.id.clone(),
                message: "a feedback node needs at least one forward input".to_string(),
            });
        }
    }
}

/// Kahn's algorithm over forward edges, ready nodes taken in declaration order
fn schedule(graph: &Graph, inputs: &[Vec<InputSlot>], errors: &mut Vec<CompileError>) -> Vec<usize> {
    let count = graph.nodes.len();
    let mut in_degree = vec![0usize; count];
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (to, slots) in inputs.iter().enumerate() {
        for slot in slots.iter().filter(|s| !s.back) {
            in_degree[to] += 1;
            successors[slot.from].push(to);
        }
    }

    let mut ready: BTreeSet<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(count);
    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &next in &successors[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() < count {
        let mut remaining: BTreeSet<usize> = (0..count).filter(|&i| in_degree[i] > 0).collect();
        // Peel off nodes that merely sit downstream of the cycle
        loop {
            let tails: Vec<usize> = remaining
                .iter()
                .copied()
                .filter(|&n| !successors[n].iter().any(|s| remaining.contains(s)))
                .collect();
            if tails.is_empty() {
                break;
            }
            for n in tails {
                remaining.remove(&n);
            }
        }
        errors.push(CompileError::Cycle {
            nodes: remaining.iter().map(|&i| graph.nodes[i].id.clone()).collect(),
        });
    }

    order
}
