//! The declared node graph
//!
//! A [`Graph`] is what the external editor hands to the compiler: nodes,
//! the edges between their ports, and nested sub-graphs. It is plain data
//! with serde support; the compiler only ever borrows it.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Unique identifier for a node within one graph
pub type NodeId = String;

/// Operator-specific configuration of a node
///
/// A JSON object of scalar (or small structured) parameters, e.g. the
/// expression text of a scripting node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeConfig(serde_json::Map<String, serde_json::Value>);

impl NodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(|v| v.as_u64())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(|v| v.as_f64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(|v| v.as_bool())
    }

    /// Deserialize an entry into a typed value
    ///
    /// Returns `Ok(None)` when the key is absent.
    pub fn parse<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> std::result::Result<Option<T>, serde_json::Error> {
        self.0
            .get(key)
            .map(|v| serde_json::from_value(v.clone()))
            .transpose()
    }

    /// Deserialize the whole configuration into an operator's config struct
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_value(serde_json::Value::Object(self.0.clone()))
    }

    pub fn set(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.0.insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for NodeConfig {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }
}

/// What a node instantiates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NodeKind {
    /// A registered operator
    #[serde(rename_all = "camelCase")]
    Operator { operator_id: String },
    /// A nested graph used as a single composite node
    Subgraph { graph: Box<Graph> },
    /// Placeholder for the composite's external input at `position`
    Input { position: usize },
    /// Placeholder for the composite's output
    Output,
}

/// A node instance in a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: NodeId,
    #[serde(flatten)]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "NodeConfig::is_empty")]
    pub config: NodeConfig,
    /// Declares the node cycle-tolerant; only valid on combinators
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub feedback: bool,
}

impl GraphNode {
    pub fn operator(id: impl Into<String>, operator_id: impl Into<String>) -> Self {
        Self::with_kind(
            id,
            NodeKind::Operator {
                operator_id: operator_id.into(),
            },
        )
    }

    pub fn subgraph(id: impl Into<String>, graph: Graph) -> Self {
        Self::with_kind(
            id,
            NodeKind::Subgraph {
                graph: Box::new(graph),
            },
        )
    }

    pub fn input(id: impl Into<String>, position: usize) -> Self {
        Self::with_kind(id, NodeKind::Input { position })
    }

    pub fn output(id: impl Into<String>) -> Self {
        Self::with_kind(id, NodeKind::Output)
    }

    fn with_kind(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            config: NodeConfig::default(),
            feedback: false,
        }
    }

    /// Set one configuration entry
    pub fn with_config(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.config.set(key, value);
        self
    }

    pub fn with_feedback(mut self) -> Self {
        self.feedback = true;
        self
    }

    /// The operator id, for operator nodes
    pub fn operator_id(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Operator { operator_id } => Some(operator_id),
            _ => None,
        }
    }
}

/// An edge from a node's output port to another node's input port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub from_node: NodeId,
    /// Nodes expose a single output; only port 0 is valid
    #[serde(default)]
    pub from_port: usize,
    pub to_node: NodeId,
    #[serde(default)]
    pub to_port: usize,
}

impl GraphEdge {
    pub fn new(from_node: impl Into<String>, to_node: impl Into<String>, to_port: usize) -> Self {
        Self {
            from_node: from_node.into(),
            from_port: 0,
            to_node: to_node.into(),
            to_port,
        }
    }
}

/// A complete node graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

impl Graph {
    /// Create a new empty graph
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    /// The nested graph of a composite node
    pub fn subgraph(&self, node_id: &str) -> Option<&Graph> {
        match &self.find_node(node_id)?.kind {
            NodeKind::Subgraph { graph } => Some(graph),
            _ => None,
        }
    }

    /// Find a node by ID
    pub fn find_node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Find a node by ID (mutable)
    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut GraphNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Get edges coming into a node, in declaration order
    pub fn incoming_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges.iter().filter(move |e| e.to_node == node_id)
    }

    /// Get edges going out of a node, in declaration order
    pub fn outgoing_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges.iter().filter(move |e| e.from_node == node_id)
    }

    pub fn add_node(&mut self, node: GraphNode) -> &mut GraphNode {
        self.nodes.push(node);
        let last = self.nodes.len() - 1;
        &mut self.nodes[last]
    }

    pub fn add_operator(
        &mut self,
        id: impl Into<String>,
        operator_id: impl Into<String>,
    ) -> &mut GraphNode {
        self.add_node(GraphNode::operator(id, operator_id))
    }

    pub fn add_subgraph(&mut self, id: impl Into<String>, graph: Graph) -> &mut GraphNode {
        self.add_node(GraphNode::subgraph(id, graph))
    }

    pub fn add_input(&mut self, id: impl Into<String>, position: usize) -> &mut GraphNode {
        self.add_node(GraphNode::input(id, position))
    }

    pub fn add_output(&mut self, id: impl Into<String>) -> &mut GraphNode {
        self.add_node(GraphNode::output(id))
    }

    /// Connect `from`'s output to input port 0 of `to`
    pub fn connect(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.connect_port(from, to, 0);
    }

    pub fn connect_port(&mut self, from: impl Into<String>, to: impl Into<String>, to_port: usize) {
        self.edges.push(GraphEdge::new(from, to, to_port));
    }

    /// Remove a node and every edge attached to it
    pub fn remove_node(&mut self, id: &str) -> Option<GraphNode> {
        let pos = self.nodes.iter().position(|n| n.id == id)?;
        self.edges.retain(|e| e.from_node != id && e.to_node != id);
        Some(self.nodes.remove(pos))
    }

    /// Change one configuration entry; returns `false` for unknown nodes
    pub fn set_config(&mut self, node_id: &str, key: impl Into<String>, value: serde_json::Value) -> bool {
        match self.find_node_mut(node_id) {
            Some(node) => {
                node.config.set(key, value);
                true
            }
            None => false,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
