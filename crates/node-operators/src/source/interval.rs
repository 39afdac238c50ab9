//! Interval Operator
//!
//! Emits the index of each tick of a periodic timer.

use std::time::Duration;

use futures::StreamExt;
use node_compiler::{
    DataType, Operation, OperatorDefinition, OperatorDescriptor, OperatorError, OperatorRole,
    Signature,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::IntervalStream;

/// Configuration for the interval operator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IntervalConfig {
    /// Milliseconds between ticks
    pub period_ms: u64,
    /// Number of ticks before completing; unbounded when absent
    pub count: Option<u64>,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            period_ms: 1000,
            count: None,
        }
    }
}

/// Interval Operator
///
/// `() -> int`. The first tick fires immediately and carries index 0.
/// Without a `count` the source only ends when the pipeline is stopped.
pub struct IntervalOperator;

impl IntervalOperator {
    pub const ID: &'static str = "interval";
}

impl OperatorDefinition for IntervalOperator {
    fn descriptor() -> OperatorDescriptor {
        OperatorDescriptor::new(Self::ID, OperatorRole::Source)
            .with_label("Interval")
            .with_description("Emits an increasing tick index every `periodMs` milliseconds")
            .with_operation(Operation::source(
                "interval",
                Signature::source(DataType::Int),
                |ctx| {
                    let config: IntervalConfig = crate::read_config(ctx.config(), Self::ID)?;
                    if config.period_ms == 0 {
                        return Err(OperatorError::new("periodMs must be greater than zero"));
                    }

                    let mut timer = tokio::time::interval(Duration::from_millis(config.period_ms));
                    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    log::debug!(
                        "IntervalOperator {}: ticking every {}ms",
                        ctx.node_id(),
                        config.period_ms
                    );

                    let ticks = IntervalStream::new(timer)
                        .enumerate()
                        .map(|(index, _)| Ok::<_, OperatorError>(json!(index)));
                    Ok(match config.count {
                        Some(count) => ticks.take(count as usize).boxed(),
                        None => ticks.boxed(),
                    })
                },
            ))
    }
}

inventory::submit!(node_compiler::OperatorFn(IntervalOperator::descriptor));

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{init_logging, run};
    use node_compiler::{Graph, OperatorExtensions, PipelineBuilder};
    use std::sync::Arc;

    fn interval_graph(period_ms: u64, count: Option<u64>) -> Graph {
        let mut graph = Graph::new("g", "G");
        let node = graph.add_operator("tick", "interval");
        node.config.set("periodMs", json!(period_ms));
        if let Some(count) = count {
            node.config.set("count", json!(count));
        }
        graph.add_operator("sink", "collect");
        graph.connect("tick", "sink");
        graph
    }

    #[test]
    fn test_default_config() {
        let config = IntervalConfig::default();
        assert_eq!(config.period_ms, 1000);
        assert!(config.count.is_none());
    }

    #[tokio::test]
    async fn test_counted_ticks() {
        let (outcome, items) = run(&interval_graph(1, Some(4))).await;
        assert!(outcome.is_ok());
        assert_eq!(items, vec![json!(0), json!(1), json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn test_zero_period_is_rejected() {
        let (outcome, _) = run(&interval_graph(0, Some(1))).await;
        let err = outcome.unwrap_err();
        assert_eq!(err.originating_node_id, "tick");
        assert_eq!(err.inner_message, "periodMs must be greater than zero");
    }

    #[tokio::test]
    async fn test_unbounded_ticks_stop_on_deactivate() {
        init_logging();
        let registry = Arc::new(crate::builtin_registry().unwrap());
        let mut extensions = OperatorExtensions::new();
        let collector = crate::setup_extensions(&mut extensions);

        let running = PipelineBuilder::new(registry)
            .with_extensions(extensions)
            .compile(&interval_graph(1, None))
            .unwrap()
            .activate()
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while collector.len() < 3 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("interval did not tick");
        assert!(!running.is_finished());

        let outcome = tokio::time::timeout(Duration::from_secs(5), running.deactivate())
            .await
            .expect("deactivate did not finish");
        assert!(outcome.is_ok());

        let items = collector.items();
        let indices: Vec<u64> = items.iter().filter_map(|v| v.as_u64()).collect();
        assert_eq!(indices, (0..items.len() as u64).collect::<Vec<_>>());
    }
}
