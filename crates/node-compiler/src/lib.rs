//! Node Compiler - typed operator graphs compiled into reactive pipelines
//!
//! This crate turns a declared graph of small typed operators (sources,
//! transforms, combinators, sinks) into one push-based pipeline running on
//! tokio. It provides:
//!
//! - A frozen operator registry with link-time registration
//! - Structural validation with deterministic topological scheduling
//! - Generic type resolution with cost-ranked overload selection
//! - Sandboxed expression nodes (rhai)
//! - Per-node error boundaries attributing runtime failures to graph nodes
//! - Ordered teardown with per-node release hooks
//!
//! # Architecture
//!
//! Compilation is synchronous and pure: [`PipelineBuilder::compile`] runs
//! structural analysis, type resolution and operation selection, collecting
//! every error into one [`GraphCompilationError`]. A successful compile
//! yields a [`CompiledPipeline`], which is activated once on a tokio
//! runtime into a [`RunningPipeline`].
//!
//! # Example
//!
//! ```ignore
//! use node_compiler::{GraphBuilder, PipelineBuilder, RegistryBuilder};
//!
//! let registry = RegistryBuilder::new().with_builtins()?.build();
//! let graph = GraphBuilder::new("g", "Doubler")
//!     .add_operator("src", "range")
//!     .add_operator("double", "scale")
//!     .connect("src", "double")
//!     .build();
//!
//! let running = PipelineBuilder::new(registry).compile(&graph)?.activate()?;
//! running.wait().await?;
//! ```

mod boundary;
pub mod builder;
mod compiler;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod expression;
pub mod extensions;
mod fragment;
pub mod graph;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
mod resolver;
pub mod types;
pub mod validation;

#[cfg(test)]
mod test_support;

// Re-export key types
pub use builder::GraphBuilder;
pub use config::{CompilerConfig, PipelineSettings, ScriptLimits};
pub use context::{Emitter, Item, ItemStream, OperationContext, ReleaseHook};
pub use descriptor::{
    Implementation, Operation, OperationBody, OperatorDefinition, OperatorDescriptor, OperatorFn,
    OperatorRole, ScriptMode, Typing,
};
pub use error::{
    CompileError, ErrorCategory, ErrorKind, ErrorReportEntry, GraphCompilationError,
    NodeRuntimeError, OperatorError, PipelineError, RegistryError, Result,
};
pub use events::{ChannelEventSink, EventError, EventSink, NullEventSink, PipelineEvent, VecEventSink};
pub use expression::ITEM_VARIABLE;
pub use extensions::OperatorExtensions;
pub use graph::{Graph, GraphEdge, GraphNode, NodeConfig, NodeId, NodeKind};
pub use orchestrator::{compile, PipelineBuilder};
pub use pipeline::{CompiledPipeline, PipelineOutcome, RunningPipeline};
pub use registry::{global, install_global, OperatorRegistry, RegistryBuilder};
pub use resolver::{EXPRESSION_KEY, OUTPUT_TYPE_KEY};
pub use types::{Arity, Binding, DataType, ParseTypeError, Signature, TypeBindings, TypePattern};
pub use validation::{topological_order, validate_graph};
