//! Operator descriptors and the operations they implement
//!
//! An [`OperatorDescriptor`] is the single source of truth for an operator:
//! its role, how many input ports it declares, how it is typed, and the
//! shape-specific [`Operation`]s that do the actual work. Operators
//! implement [`OperatorDefinition`] and are collected at link time via
//! [`OperatorFn`].
//!
//! # Example
//!
//! ```ignore
//! use node_compiler::{Operation, OperatorDefinition, OperatorDescriptor, OperatorRole};
//! use node_compiler::{DataType, Signature};
//!
//! pub struct Negate;
//!
//! impl OperatorDefinition for Negate {
//!     fn descriptor() -> OperatorDescriptor {
//!         OperatorDescriptor::new("negate", OperatorRole::Transform)
//!             .with_label("Negate")
//!             .with_operation(Operation::map(
//!                 "negate-int",
//!                 Signature::unary(DataType::Int, DataType::Int),
//!                 |item, _config| Ok(serde_json::json!(-item.as_i64().unwrap_or_default())),
//!             ))
//!     }
//! }
//!
//! inventory::submit!(node_compiler::OperatorFn(Negate::descriptor));
//! ```

use std::fmt;
use std::sync::Arc;

use futures::{future, stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::context::{Emitter, Item, ItemStream, OperationContext};
use crate::error::{OperatorError, RegistryError};
use crate::graph::NodeConfig;
use crate::types::{Arity, DataType, Signature};

/// Trait for operators that can describe themselves
pub trait OperatorDefinition {
    /// Get the static descriptor for this operator
    fn descriptor() -> OperatorDescriptor
    where
        Self: Sized;
}

/// A descriptor factory submitted to the link-time registry
///
/// Collected by [`RegistryBuilder::with_builtins`](crate::RegistryBuilder::with_builtins).
pub struct OperatorFn(pub fn() -> OperatorDescriptor);

inventory::collect!(OperatorFn);

/// The role an operator fulfils in a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorRole {
    /// Produces items; no inputs
    Source,
    /// One input, one output
    Transform,
    /// N ordered inputs, one output
    Combinator,
    /// One input; observes items for side effects and passes them on
    Sink,
}

impl OperatorRole {
    /// Number of input ports an operator of this role declares by default
    pub fn default_ports(&self) -> usize {
        match self {
            OperatorRole::Source => 0,
            _ => 1,
        }
    }
}

impl fmt::Display for OperatorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperatorRole::Source => "source",
            OperatorRole::Transform => "transform",
            OperatorRole::Combinator => "combinator",
            OperatorRole::Sink => "sink",
        };
        f.write_str(name)
    }
}

/// Produces a node's output stream from nothing
pub type SourceFn =
    Arc<dyn Fn(&mut OperationContext<'_>) -> Result<ItemStream, OperatorError> + Send + Sync>;

/// Produces a node's output stream from its single input
pub type TransformFn = Arc<
    dyn Fn(ItemStream, &mut OperationContext<'_>) -> Result<ItemStream, OperatorError> + Send + Sync,
>;

/// Produces a node's output stream from its ordered inputs
pub type CombinatorFn = Arc<
    dyn Fn(Vec<ItemStream>, &mut OperationContext<'_>) -> Result<ItemStream, OperatorError>
        + Send
        + Sync,
>;

/// Custom typing: input types and node configuration to an output type
pub type TypeFn = Arc<dyn Fn(&[DataType], &NodeConfig) -> Result<DataType, String> + Send + Sync>;

/// The executable part of an operation
#[derive(Clone)]
pub enum OperationBody {
    Source(SourceFn),
    Transform(TransformFn),
    Combinator(CombinatorFn),
}

impl OperationBody {
    fn role_name(&self) -> &'static str {
        match self {
            OperationBody::Source(_) => "source",
            OperationBody::Transform(_) => "transform",
            OperationBody::Combinator(_) => "combinator",
        }
    }
}

/// One shape-specific implementation of an operator
#[derive(Clone)]
pub struct Operation {
    pub name: String,
    pub signature: Signature,
    pub body: OperationBody,
}

impl Operation {
    /// A source from a raw stream factory
    pub fn source<F>(name: impl Into<String>, signature: Signature, build: F) -> Self
    where
        F: Fn(&mut OperationContext<'_>) -> Result<ItemStream, OperatorError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            signature,
            body: OperationBody::Source(Arc::new(build)),
        }
    }

    /// A finite source that emits the items computed from its configuration
    pub fn from_iter<F>(name: impl Into<String>, signature: Signature, items: F) -> Self
    where
        F: Fn(&NodeConfig) -> Result<Vec<Item>, OperatorError> + Send + Sync + 'static,
    {
        Self::source(name, signature, move |ctx| {
            let values = items(ctx.config())?;
            Ok(stream::iter(values.into_iter().map(Ok)).boxed())
        })
    }

    /// A source that pushes items from its own thread
    ///
    /// The producer runs until it returns or [`Emitter::emit`] reports the
    /// pipeline is stopping. The thread is joined when the pipeline is
    /// released.
    pub fn push_source<F>(name: impl Into<String>, signature: Signature, produce: F) -> Self
    where
        F: Fn(Emitter, &NodeConfig) -> Result<(), OperatorError> + Send + Sync + 'static,
    {
        let produce = Arc::new(produce);
        Self::source(name, signature, move |ctx| {
            let (tx, rx) = mpsc::unbounded_channel();
            let emitter = Emitter::new(tx.clone(), ctx.stop_token());
            let produce = produce.clone();
            let config = ctx.shared_config();
            let handle = std::thread::Builder::new()
                .name(format!("source-{}", ctx.node_id()))
                .spawn(move || {
                    if let Err(e) = produce(emitter, &*config) {
                        let _ = tx.send(Err(e));
                    }
                })
                .map_err(|e| OperatorError::with_source("failed to spawn source thread", e))?;
            ctx.on_release(move || {
                let _ = handle.join();
            });
            Ok(UnboundedReceiverStream::new(rx).boxed())
        })
    }

    /// A transform from a raw stream function
    pub fn transform<F>(name: impl Into<String>, signature: Signature, apply: F) -> Self
    where
        F: Fn(ItemStream, &mut OperationContext<'_>) -> Result<ItemStream, OperatorError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            signature,
            body: OperationBody::Transform(Arc::new(apply)),
        }
    }

    /// A per-item transform
    pub fn map<F>(name: impl Into<String>, signature: Signature, f: F) -> Self
    where
        F: Fn(Item, &NodeConfig) -> Result<Item, OperatorError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Self::transform(name, signature, move |input, ctx| {
            let f = f.clone();
            let config = ctx.shared_config();
            Ok(input
                .map(move |item| item.and_then(|value| f(value, &*config)))
                .boxed())
        })
    }

    /// A per-item predicate; items for which it returns `false` are dropped
    pub fn filter<F>(name: impl Into<String>, signature: Signature, predicate: F) -> Self
    where
        F: Fn(&Item, &NodeConfig) -> Result<bool, OperatorError> + Send + Sync + 'static,
    {
        let predicate = Arc::new(predicate);
        Self::transform(name, signature, move |input, ctx| {
            let predicate = predicate.clone();
            let config = ctx.shared_config();
            Ok(input
                .filter_map(move |item| {
                    let out = match item {
                        Ok(value) => match predicate(&value, &*config) {
                            Ok(true) => Some(Ok(value)),
                            Ok(false) => None,
                            Err(e) => Some(Err(e)),
                        },
                        Err(e) => Some(Err(e)),
                    };
                    future::ready(out)
                })
                .boxed())
        })
    }

    /// A side-effecting observer that passes every item through unchanged
    pub fn sink<F>(name: impl Into<String>, signature: Signature, observe: F) -> Self
    where
        F: Fn(&Item, &NodeConfig) -> Result<(), OperatorError> + Send + Sync + 'static,
    {
        Self::map(name, signature, move |item, config| {
            observe(&item, config)?;
            Ok(item)
        })
    }

    /// A combinator from a raw multi-stream function
    pub fn combinator<F>(name: impl Into<String>, signature: Signature, combine: F) -> Self
    where
        F: Fn(Vec<ItemStream>, &mut OperationContext<'_>) -> Result<ItemStream, OperatorError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            signature,
            body: OperationBody::Combinator(Arc::new(combine)),
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("signature", &self.signature.to_string())
            .field("body", &self.body.role_name())
            .finish()
    }
}

/// How an operator's output type is computed
#[derive(Clone)]
pub enum Typing {
    /// From the signatures of its operations
    Derived,
    /// From a function of the input types and the node's configuration
    Custom(TypeFn),
}

/// Mode of a scripting operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptMode {
    /// Replace each item with the expression's value
    Map,
    /// Keep items for which the expression is `true`
    Filter,
}

/// What executes a node of this operator
#[derive(Clone)]
pub enum Implementation {
    /// Shape-specific native operations
    Native(Vec<Operation>),
    /// The node's `expression` configuration, compiled per node
    Script(ScriptMode),
}

/// Complete description of a registered operator
#[derive(Clone)]
pub struct OperatorDescriptor {
    /// Unique identifier (e.g., "scale")
    pub id: String,
    pub role: OperatorRole,
    /// Human-readable label
    pub label: String,
    pub description: String,
    /// Number of declared input ports
    pub input_ports: usize,
    pub typing: Typing,
    pub implementation: Implementation,
}

impl OperatorDescriptor {
    /// Create a native descriptor with the role's default port count
    pub fn new(id: impl Into<String>, role: OperatorRole) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            role,
            description: String::new(),
            input_ports: role.default_ports(),
            typing: Typing::Derived,
            implementation: Implementation::Native(Vec::new()),
        }
    }

    /// Create a scripting transform
    pub fn script(id: impl Into<String>, mode: ScriptMode) -> Self {
        let mut descriptor = Self::new(id, OperatorRole::Transform);
        descriptor.implementation = Implementation::Script(mode);
        descriptor
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_ports(mut self, ports: usize) -> Self {
        self.input_ports = ports;
        self
    }

    /// Add a shape-specific operation
    ///
    /// Ignored on scripting descriptors, which carry no native operations.
    pub fn with_operation(mut self, operation: Operation) -> Self {
        if let Implementation::Native(operations) = &mut self.implementation {
            operations.push(operation);
        }
        self
    }

    /// Replace derived typing with a custom type function
    pub fn with_typing<F>(mut self, typing: F) -> Self
    where
        F: Fn(&[DataType], &NodeConfig) -> Result<DataType, String> + Send + Sync + 'static,
    {
        self.typing = Typing::Custom(Arc::new(typing));
        self
    }

    /// Native operations; empty for scripting operators
    pub fn operations(&self) -> &[Operation] {
        match &self.implementation {
            Implementation::Native(operations) => operations,
            Implementation::Script(_) => &[],
        }
    }

    pub fn script_mode(&self) -> Option<ScriptMode> {
        match self.implementation {
            Implementation::Script(mode) => Some(mode),
            Implementation::Native(_) => None,
        }
    }

    /// Human-readable input shapes, used in type mismatch reports
    pub fn expected_shapes(&self) -> Vec<String> {
        match &self.implementation {
            Implementation::Native(operations) => {
                operations.iter().map(|op| op.signature.to_string()).collect()
            }
            Implementation::Script(ScriptMode::Map) => vec!["(T) -> expression".to_string()],
            Implementation::Script(ScriptMode::Filter) => vec!["(T) -> T".to_string()],
        }
    }

    /// Check that role, port count and operations agree
    pub fn validate(&self) -> Result<(), RegistryError> {
        let invalid = |message: String| RegistryError::InvalidDescriptor {
            id: self.id.clone(),
            message,
        };

        if self.id.is_empty() {
            return Err(invalid("operator id must not be empty".to_string()));
        }
        if self.id.contains('/') {
            return Err(invalid("operator id must not contain '/'".to_string()));
        }

        match self.role {
            OperatorRole::Source if self.input_ports != 0 => {
                return Err(invalid("a source declares no input ports".to_string()));
            }
            OperatorRole::Transform | OperatorRole::Sink if self.input_ports != 1 => {
                return Err(invalid(format!(
                    "a {} declares exactly one input port",
                    self.role
                )));
            }
            OperatorRole::Combinator if self.input_ports == 0 => {
                return Err(invalid("a combinator declares at least one input port".to_string()));
            }
            _ => {}
        }

        let operations = match &self.implementation {
            Implementation::Script(_) if self.role != OperatorRole::Transform => {
                return Err(invalid("scripting operators must be transforms".to_string()));
            }
            Implementation::Script(_) => return Ok(()),
            Implementation::Native(operations) => operations,
        };

        if operations.is_empty() {
            return Err(invalid("no operations declared".to_string()));
        }

        for op in operations {
            let body_fits = matches!(
                (self.role, &op.body),
                (OperatorRole::Source, OperationBody::Source(_))
                    | (OperatorRole::Transform, OperationBody::Transform(_))
                    | (OperatorRole::Sink, OperationBody::Transform(_))
                    | (OperatorRole::Combinator, OperationBody::Combinator(_))
            );
            if !body_fits {
                return Err(invalid(format!(
                    "operation '{}' has a {} body but the operator is a {}",
                    op.name,
                    op.body.role_name(),
                    self.role
                )));
            }

            let arity_fits = match (self.role, &op.signature.inputs) {
                (OperatorRole::Source, Arity::Fixed(p)) => p.is_empty(),
                (OperatorRole::Transform | OperatorRole::Sink, Arity::Fixed(p)) => p.len() == 1,
                (OperatorRole::Combinator, Arity::Fixed(p)) => !p.is_empty(),
                (OperatorRole::Combinator, Arity::Variadic { .. }) => true,
                _ => false,
            };
            if !arity_fits {
                return Err(invalid(format!(
                    "operation '{}' signature {} does not fit a {}",
                    op.name, op.signature, self.role
                )));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for OperatorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let typing = match self.typing {
            Typing::Derived => "derived",
            Typing::Custom(_) => "custom",
        };
        f.debug_struct("OperatorDescriptor")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("label", &self.label)
            .field("input_ports", &self.input_ports)
            .field("typing", &typing)
            .field("operations", &self.operations())
            .field("script", &self.script_mode())
            .finish()
    }
}
