//! Helpers for running small graphs against the built-in registry

use std::sync::Arc;
use std::time::Duration;

use node_compiler::{
    CompiledPipeline, Graph, GraphCompilationError, OperatorExtensions, OperatorRegistry,
    PipelineBuilder, PipelineOutcome,
};
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::setup::{builtin_registry, setup_extensions};

static REGISTRY: Lazy<Arc<OperatorRegistry>> =
    Lazy::new(|| Arc::new(builtin_registry().expect("built-in operators are valid")));

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn compile(graph: &Graph) -> Result<CompiledPipeline, GraphCompilationError> {
    PipelineBuilder::new(REGISTRY.clone()).compile(graph)
}

/// Run a graph to completion and return what its `collect` nodes saw
pub async fn run(graph: &Graph) -> (PipelineOutcome, Vec<Value>) {
    init_logging();
    let mut extensions = OperatorExtensions::new();
    let collector = setup_extensions(&mut extensions);
    let running = compile(graph)
        .expect("graph compiles")
        .with_extensions(extensions)
        .activate()
        .expect("pipeline activates");
    let outcome = tokio::time::timeout(Duration::from_secs(5), running.wait())
        .await
        .expect("pipeline did not finish");
    (outcome, collector.items())
}

/// `source -> operator -> collect`
pub fn linear(source: &str, operator: &str) -> Graph {
    let mut graph = Graph::new("g", "G");
    graph.add_operator("src", source);
    graph.add_operator("op", operator);
    graph.add_operator("sink", "collect");
    graph.connect("src", "op");
    graph.connect("op", "sink");
    graph
}
