//! Pipeline builder
//!
//! Drives one compile attempt through its phases:
//!
//! 1. structural analysis and scheduling (fatal on any error)
//! 2. type resolution, expression compilation included (collects errors)
//! 3. operation selection and fragment emission (collects errors)
//!
//! If any phase recorded an error, the attempt returns a single
//! [`GraphCompilationError`] carrying all of them. Otherwise the fragments
//! are folded into a [`CompiledPipeline`].

use std::sync::Arc;

use crate::compiler::compile_plan;
use crate::config::CompilerConfig;
use crate::error::{CompileError, GraphCompilationError, RegistryError};
use crate::events::{EventSink, NullEventSink};
use crate::expression::ScriptEngine;
use crate::extensions::OperatorExtensions;
use crate::graph::Graph;
use crate::pipeline::CompiledPipeline;
use crate::registry::{self, OperatorRegistry};
use crate::resolver::resolve;
use crate::validation::{analyze, validate_graph};

/// Compiles graphs against one registry and configuration
pub struct PipelineBuilder {
    registry: Arc<OperatorRegistry>,
    config: CompilerConfig,
    extensions: Arc<OperatorExtensions>,
    events: Arc<dyn EventSink>,
}

impl PipelineBuilder {
    /// Create a builder over the given registry with default configuration
    pub fn new(registry: impl Into<Arc<OperatorRegistry>>) -> Self {
        Self {
            registry: registry.into(),
            config: CompilerConfig::default(),
            extensions: Arc::new(OperatorExtensions::new()),
            events: Arc::new(NullEventSink),
        }
    }

    /// Create a builder over the process-wide registry
    pub fn from_global() -> Result<Self, RegistryError> {
        registry::global()
            .map(Self::new)
            .ok_or(RegistryError::NotInstalled)
    }

    pub fn with_config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Runtime objects handed to every pipeline compiled by this builder
    pub fn with_extensions(mut self, extensions: OperatorExtensions) -> Self {
        self.extensions = Arc::new(extensions);
        self
    }

    /// Sink receiving lifecycle events of pipelines compiled by this builder
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn registry(&self) -> &OperatorRegistry {
        &self.registry
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Run only the structural checks
    pub fn validate(&self, graph: &Graph) -> Vec<CompileError> {
        validate_graph(graph, &self.registry)
    }

    /// Compile a graph into an executable pipeline
    pub fn compile(&self, graph: &Graph) -> Result<CompiledPipeline, GraphCompilationError> {
        log::debug!(
            "Compiling graph '{}' ({} nodes, {} edges)",
            graph.id,
            graph.nodes.len(),
            graph.edges.len()
        );

        let analysis = analyze(graph, &self.registry).map_err(|errors| {
            log::debug!("Graph '{}' failed structural analysis: {} error(s)", graph.id, errors.len());
            GraphCompilationError::new(errors)
        })?;

        let engine = ScriptEngine::new(&self.config.script);
        let mut errors = Vec::new();
        let resolution = resolve(&analysis, &[], &engine, &mut errors);
        let plan = compile_plan(&analysis, &resolution, None, &mut errors);

        match plan {
            Some(plan) if errors.is_empty() => {
                log::info!(
                    "Compiled graph '{}' into a pipeline of {} nodes",
                    graph.id,
                    plan.node_count()
                );
                Ok(CompiledPipeline::new(
                    plan,
                    self.config.clone(),
                    self.extensions.clone(),
                    self.events.clone(),
                ))
            }
            _ => {
                log::debug!("Graph '{}' failed to compile: {} error(s)", graph.id, errors.len());
                Err(GraphCompilationError::new(errors))
            }
        }
    }
}

/// Compile a graph with default configuration
pub fn compile(
    graph: &Graph,
    registry: Arc<OperatorRegistry>,
) -> Result<CompiledPipeline, GraphCompilationError> {
    PipelineBuilder::new(registry).compile(graph)
}
