//! Error types for the node compiler
//!
//! Compile-time problems are plain values ([`CompileError`]) collected into a
//! single [`GraphCompilationError`] report. Runtime failures are always
//! attributed to the node that raised them ([`NodeRuntimeError`]).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::DataType;

/// Result type alias using PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Top-level error for the crate's fallible entry points
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The graph failed to compile
    #[error(transparent)]
    Compilation(#[from] GraphCompilationError),

    /// Operator registry error
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A node failed while the pipeline was running
    #[error(transparent)]
    Runtime(#[from] NodeRuntimeError),

    /// `activate` was called outside of a tokio runtime
    #[error("Pipeline activation requires a running tokio runtime")]
    NoRuntime,

    /// Configuration or graph (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the operator registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Operator '{0}' is already registered")]
    Duplicate(String),

    #[error("Operator '{0}' is not registered")]
    NotFound(String),

    #[error("Invalid descriptor for operator '{id}': {message}")]
    InvalidDescriptor { id: String, message: String },

    #[error("A process-wide operator registry is already installed")]
    AlreadyInstalled,

    #[error("No process-wide operator registry has been installed")]
    NotInstalled,
}

/// Broad class of a compile-time error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Graph shape problems, detected before resolution
    Structural,
    /// Type resolution and operation selection problems
    Typing,
    /// Scripting node text that does not compile
    Expression,
}

/// Machine-readable kind of a compile-time error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    IncompleteGraph,
    Cycle,
    DuplicateNode,
    UnknownNode,
    UnknownOperator,
    InvalidPort,
    PortOverConnected,
    InvalidPlaceholder,
    InvalidFeedback,
    TypeMismatch,
    AmbiguousOperation,
    NoMatchingOperation,
    ExpressionCompilation,
}

impl ErrorKind {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::TypeMismatch | Self::AmbiguousOperation | Self::NoMatchingOperation => {
                ErrorCategory::Typing
            }
            Self::ExpressionCompilation => ErrorCategory::Expression,
            _ => ErrorCategory::Structural,
        }
    }
}

/// A single compile-time error, attributed to a node
///
/// Node ids inside sub-graphs are paths (`outer/inner`).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("Node '{node_id}' has unconnected input ports {ports:?}")]
    IncompleteGraph { node_id: String, ports: Vec<usize> },

    #[error("Cycle detected through nodes {nodes:?}")]
    Cycle { nodes: Vec<String> },

    #[error("Node id '{node_id}' is declared more than once")]
    DuplicateNode { node_id: String },

    #[error("Edge {edge_index} references unknown node '{node_id}'")]
    UnknownNode { edge_index: usize, node_id: String },

    #[error("Node '{node_id}' references unknown operator '{operator_id}'")]
    UnknownOperator { node_id: String, operator_id: String },

    #[error("Node '{node_id}' has no port {port}: {message}")]
    InvalidPort {
        node_id: String,
        port: usize,
        message: String,
    },

    #[error("Input port {port} on node '{node_id}' accepts one edge but has {edges}")]
    PortOverConnected {
        node_id: String,
        port: usize,
        edges: usize,
    },

    #[error("Invalid placeholder '{node_id}': {message}")]
    InvalidPlaceholder { node_id: String, message: String },

    #[error("Invalid feedback node '{node_id}': {message}")]
    InvalidFeedback { node_id: String, message: String },

    #[error("Node '{node_id}' cannot accept {actual} (expected one of {expected})", actual = fmt_types(.actual_types), expected = .expected_shapes.join(" | "))]
    TypeMismatch {
        node_id: String,
        expected_shapes: Vec<String>,
        actual_types: Vec<DataType>,
    },

    #[error("Node '{node_id}' matches several operations equally well: {}", .candidates.join(", "))]
    AmbiguousOperation {
        node_id: String,
        candidates: Vec<String>,
    },

    #[error("Node '{node_id}' has no operation accepting {}", fmt_types(.actual_types))]
    NoMatchingOperation {
        node_id: String,
        actual_types: Vec<DataType>,
    },

    #[error("Expression on node '{node_id}' does not compile: {message}")]
    ExpressionCompilation { node_id: String, message: String },
}

fn fmt_types(types: &[DataType]) -> String {
    let parts: Vec<String> = types.iter().map(|t| t.to_string()).collect();
    format!("({})", parts.join(", "))
}

impl CompileError {
    /// The kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::IncompleteGraph { .. } => ErrorKind::IncompleteGraph,
            Self::Cycle { .. } => ErrorKind::Cycle,
            Self::DuplicateNode { .. } => ErrorKind::DuplicateNode,
            Self::UnknownNode { .. } => ErrorKind::UnknownNode,
            Self::UnknownOperator { .. } => ErrorKind::UnknownOperator,
            Self::InvalidPort { .. } => ErrorKind::InvalidPort,
            Self::PortOverConnected { .. } => ErrorKind::PortOverConnected,
            Self::InvalidPlaceholder { .. } => ErrorKind::InvalidPlaceholder,
            Self::InvalidFeedback { .. } => ErrorKind::InvalidFeedback,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::AmbiguousOperation { .. } => ErrorKind::AmbiguousOperation,
            Self::NoMatchingOperation { .. } => ErrorKind::NoMatchingOperation,
            Self::ExpressionCompilation { .. } => ErrorKind::ExpressionCompilation,
        }
    }

    /// The node this error is attributed to
    ///
    /// Cycle errors report the first node on the cycle.
    pub fn node_id(&self) -> &str {
        match self {
            Self::Cycle { nodes } => nodes.first().map(String::as_str).unwrap_or(""),
            Self::IncompleteGraph { node_id, .. }
            | Self::DuplicateNode { node_id }
            | Self::UnknownNode { node_id, .. }
            | Self::UnknownOperator { node_id, .. }
            | Self::InvalidPort { node_id, .. }
            | Self::PortOverConnected { node_id, .. }
            | Self::InvalidPlaceholder { node_id, .. }
            | Self::InvalidFeedback { node_id, .. }
            | Self::TypeMismatch { node_id, .. }
            | Self::AmbiguousOperation { node_id, .. }
            | Self::NoMatchingOperation { node_id, .. }
            | Self::ExpressionCompilation { node_id, .. } => node_id,
        }
    }

    /// Prefix the attributed node id(s) with a sub-graph path segment
    pub(crate) fn nested_in(mut self, parent: &str) -> Self {
        let prefix = |id: &mut String| *id = format!("{}/{}", parent, id);
        match &mut self {
            Self::Cycle { nodes } => nodes.iter_mut().for_each(prefix),
            Self::IncompleteGraph { node_id, .. }
            | Self::DuplicateNode { node_id }
            | Self::UnknownNode { node_id, .. }
            | Self::UnknownOperator { node_id, .. }
            | Self::InvalidPort { node_id, .. }
            | Self::PortOverConnected { node_id, .. }
            | Self::InvalidPlaceholder { node_id, .. }
            | Self::InvalidFeedback { node_id, .. }
            | Self::TypeMismatch { node_id, .. }
            | Self::AmbiguousOperation { node_id, .. }
            | Self::NoMatchingOperation { node_id, .. }
            | Self::ExpressionCompilation { node_id, .. } => prefix(node_id),
        }
        self
    }
}

/// One row of the report handed to the editor for fault highlighting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReportEntry {
    pub node_id: String,
    pub error_kind: ErrorKind,
    pub message: String,
}

/// Every error collected during one compile attempt
#[derive(Debug, Clone, Error)]
#[error("Graph compilation failed with {} error(s)", .errors.len())]
pub struct GraphCompilationError {
    errors: Vec<CompileError>,
}

impl GraphCompilationError {
    pub fn new(errors: Vec<CompileError>) -> Self {
        Self { errors }
    }

    /// All collected errors, in detection order
    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }

    /// Errors attributed to one node
    pub fn for_node<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a CompileError> + 'a {
        self.errors.iter().filter(move |e| e.node_id() == node_id)
    }

    /// Whether the attempt stopped at the structural phase
    pub fn is_structural(&self) -> bool {
        self.errors
            .iter()
            .any(|e| e.kind().category() == ErrorCategory::Structural)
    }

    /// Structured `{nodeId, errorKind, message}` rows
    pub fn report(&self) -> Vec<ErrorReportEntry> {
        self.errors
            .iter()
            .map(|e| ErrorReportEntry {
                node_id: e.node_id().to_string(),
                error_kind: e.kind(),
                message: e.to_string(),
            })
            .collect()
    }

    /// The report serialized as JSON
    pub fn report_json(&self) -> serde_json::Value {
        serde_json::to_value(self.report()).unwrap_or(serde_json::Value::Null)
    }
}

/// Failure raised by an operator implementation while processing items
#[derive(Debug, Error)]
#[error("{message}")]
pub struct OperatorError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl OperatorError {
    /// Create an operator error with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an operator error wrapping an underlying cause
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn into_parts(self) -> (String, Option<Box<dyn std::error::Error + Send + Sync>>) {
        (self.message, self.source)
    }
}

/// A runtime failure attributed to the graph node that raised it
#[derive(Debug, Clone)]
pub struct NodeRuntimeError {
    pub originating_node_id: String,
    pub inner_message: String,
    pub inner_cause: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl NodeRuntimeError {
    pub fn new(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            originating_node_id: node_id.into(),
            inner_message: message.into(),
            inner_cause: None,
        }
    }

    /// Attribute an operator failure to a node
    pub fn from_operator(node_id: impl Into<String>, error: OperatorError) -> Self {
        let (message, source) = error.into_parts();
        Self {
            originating_node_id: node_id.into(),
            inner_message: message,
            inner_cause: source.map(Arc::from),
        }
    }
}

impl std::fmt::Display for NodeRuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Node '{}' failed: {}",
            self.originating_node_id, self.inner_message
        )
    }
}

impl std::error::Error for NodeRuntimeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner_cause
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
