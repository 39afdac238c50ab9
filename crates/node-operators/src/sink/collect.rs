//! Collect Operator
//!
//! Appends every item to a host-provided [`Collector`].

use std::sync::Arc;

use futures::StreamExt;
use node_compiler::{Item, Operation, OperatorDefinition, OperatorDescriptor, OperatorRole};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::transform::passthrough;

/// Extension key `collect` nodes use unless configured otherwise
pub const DEFAULT_COLLECTOR: &str = "collector";

/// Shared, growable item buffer filled by `collect` nodes
///
/// Cloning yields another handle onto the same buffer, so the host keeps
/// one handle and installs another in the pipeline's extensions.
#[derive(Debug, Clone, Default)]
pub struct Collector {
    items: Arc<Mutex<Vec<Item>>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: Item) {
        self.items.lock().push(item);
    }

    /// Snapshot of everything collected so far
    pub fn items(&self) -> Vec<Item> {
        self.items.lock().clone()
    }

    /// Remove and return everything collected so far
    pub fn drain(&self) -> Vec<Item> {
        std::mem::take(&mut *self.items.lock())
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

/// Configuration for the collect operator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectConfig {
    /// Extension key of the target collector
    pub collector: String,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            collector: DEFAULT_COLLECTOR.to_string(),
        }
    }
}

/// Collect Operator
///
/// `(T) -> T`. The collector is looked up when the pipeline activates; a
/// missing collector fails activation, attributed to this node.
pub struct CollectOperator;

impl CollectOperator {
    pub const ID: &'static str = "collect";
}

impl OperatorDefinition for CollectOperator {
    fn descriptor() -> OperatorDescriptor {
        OperatorDescriptor::new(Self::ID, OperatorRole::Sink)
            .with_label("Collect")
            .with_description("Appends every item to a host-provided collector")
            .with_operation(Operation::transform("collect", passthrough(), |input, ctx| {
                let config: CollectConfig = crate::read_config(ctx.config(), Self::ID)?;
                let collector = ctx
                    .extensions()
                    .handle::<Collector>(&config.collector, "collector")?;
                Ok(input
                    .map(move |item| {
                        if let Ok(value) = &item {
                            collector.push(value.clone());
                        }
                        item
                    })
                    .boxed())
            }))
    }
}

inventory::submit!(node_compiler::OperatorFn(CollectOperator::descriptor));

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::install_collector;
    use crate::testing::{compile, init_logging, run};
    use node_compiler::{Graph, OperatorExtensions};
    use serde_json::json;

    #[test]
    fn test_collector_handles_share_buffer() {
        let collector = Collector::new();
        let handle = collector.clone();
        handle.push(json!(1));
        handle.push(json!(2));
        assert_eq!(collector.len(), 2);
        assert_eq!(collector.drain(), vec![json!(1), json!(2)]);
        assert!(handle.is_empty());
    }

    #[tokio::test]
    async fn test_named_collectors() {
        init_logging();
        let mut graph = Graph::new("g", "G");
        graph.add_operator("src", "range").config.set("count", json!(4));
        graph.add_operator("evens", "condition").config.set("expression", json!("it % 2 == 0"));
        graph.add_operator("all", "collect");
        graph.add_operator("even", "collect").config.set("collector", json!("evens"));
        graph.connect("src", "all");
        graph.connect("src", "evens");
        graph.connect("evens", "even");

        let mut extensions = OperatorExtensions::new();
        let all = crate::setup_extensions(&mut extensions);
        let evens = install_collector(&mut extensions, "evens");
        let running = compile(&graph)
            .unwrap()
            .with_extensions(extensions)
            .activate()
            .unwrap();
        assert!(running.wait().await.is_ok());

        assert_eq!(all.items(), vec![json!(0), json!(1), json!(2), json!(3)]);
        assert_eq!(evens.items(), vec![json!(0), json!(2)]);
    }

    #[tokio::test]
    async fn test_missing_collector_fails_activation() {
        let mut graph = Graph::new("g", "G");
        graph.add_operator("src", "range");
        graph.add_operator("sink", "collect").config.set("collector", json!("nowhere"));
        graph.connect("src", "sink");

        let (outcome, _) = run(&graph).await;
        let err = outcome.unwrap_err();
        assert_eq!(err.originating_node_id, "sink");
        assert_eq!(err.inner_message, "no collector 'nowhere' installed");
    }
}
