//! Fluent builder for operator graphs
//!
//! Provides a chainable API for constructing graphs programmatically.

use crate::graph::{Graph, GraphEdge, GraphNode};

/// Fluent builder for constructing operator graphs
///
/// # Example
///
/// ```ignore
/// let graph = GraphBuilder::new("g-1", "Doubler")
///     .add_operator("src", "range")
///     .with_config("count", serde_json::json!(3))
///     .add_operator("double", "scale")
///     .add_operator("sink", "collect")
///     .connect("src", "double")
///     .connect("double", "sink")
///     .build();
/// ```
pub struct GraphBuilder {
    id: String,
    name: String,
    nodes: Vec<GraphNode>,
    edges: Vec<GraphEdge>,
}

impl GraphBuilder {
    /// Create a new graph builder
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Add a node running a registered operator
    pub fn add_operator(mut self, id: impl Into<String>, operator_id: impl Into<String>) -> Self {
        self.nodes.push(GraphNode::operator(id, operator_id));
        self
    }

    /// Add a composite node wrapping a nested graph
    pub fn add_subgraph(mut self, id: impl Into<String>, graph: Graph) -> Self {
        self.nodes.push(GraphNode::subgraph(id, graph));
        self
    }

    /// Add an `Input` placeholder (inside sub-graphs only)
    pub fn add_input(mut self, id: impl Into<String>, position: usize) -> Self {
        self.nodes.push(GraphNode::input(id, position));
        self
    }

    /// Add the `Output` placeholder (inside sub-graphs only)
    pub fn add_output(mut self, id: impl Into<String>) -> Self {
        self.nodes.push(GraphNode::output(id));
        self
    }

    /// Set a configuration entry on the most recently added node
    ///
    /// Must be called immediately after adding the node.
    pub fn with_config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.config.set(key, value);
        }
        self
    }

    /// Declare the most recently added node cycle-tolerant
    pub fn feedback(mut self) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.feedback = true;
        }
        self
    }

    /// Connect `from` to input port 0 of `to`
    pub fn connect(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.connect_port(from, to, 0)
    }

    /// Connect `from` to a specific input port of `to`
    pub fn connect_port(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        to_port: usize,
    ) -> Self {
        self.edges.push(GraphEdge::new(from, to, to_port));
        self
    }

    /// Build the graph without validation
    pub fn build(self) -> Graph {
        let mut graph = Graph::new(self.id, self.name);
        graph.nodes = self.nodes;
        graph.edges = self.edges;
        graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;
    use serde_json::json;

    #[test]
    fn test_graph_builder_basic() {
        let graph = GraphBuilder::new("g-1", "Test Graph")
            .add_operator("src", "numbers")
            .with_config("values", json!([1, 2]))
            .add_operator("sink", "collect")
            .connect("src", "sink")
            .build();

        assert_eq!(graph.id, "g-1");
        assert_eq!(graph.name, "Test Graph");
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.nodes[0].config.get("values"), Some(&json!([1, 2])));
        assert_eq!(graph.edges[0].to_port, 0);
    }

    #[test]
    fn test_graph_builder_ports_and_feedback() {
        let graph = GraphBuilder::new("g", "Loop")
            .add_operator("a", "numbers")
            .add_operator("m", "merge")
            .feedback()
            .add_operator("p", "pair")
            .connect("a", "m")
            .connect_port("m", "p", 0)
            .connect_port("a", "p", 1)
            .build();

        assert!(graph.find_node("m").unwrap().feedback);
        assert!(!graph.find_node("a").unwrap().feedback);
        assert_eq!(graph.edges[2].to_port, 1);
    }

    #[test]
    fn test_graph_builder_subgraph() {
        let inner = GraphBuilder::new("inner", "Inner")
            .add_input("in", 0)
            .add_output("out")
            .connect("in", "out")
            .build();
        let graph = GraphBuilder::new("outer", "Outer")
            .add_subgraph("group", inner)
            .build();

        assert!(matches!(graph.nodes[0].kind, NodeKind::Subgraph { .. }));
        assert_eq!(graph.subgraph("group").unwrap().nodes.len(), 2);
    }
}
