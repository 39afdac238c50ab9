//! Compiled and running pipelines
//!
//! A [`CompiledPipeline`] owns its folded plan and nothing else; activating
//! it instantiates every fragment in activation order on the current tokio
//! runtime and hands back a [`RunningPipeline`].
//!
//! Wiring rules:
//! - a node with exactly one forward consumer hands its stream over
//!   directly (lazy composition, no task);
//! - a node with several consumers gets a hub task that clones every item
//!   into one unbounded queue per consumer, logging a warning when a
//!   consumer falls far behind;
//! - feedback edges are unbounded channels, closed once every forward
//!   input of the feedback node has completed;
//! - a node with no consumers gets a terminal task that drives it.
//!
//! A supervisor task joins every spawned task, runs release hooks in
//! reverse activation order and publishes the outcome.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::Poll;

use futures::{future, stream, Future, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::boundary::{panic_message, ErrorBoundary, FailureSlot};
use crate::config::CompilerConfig;
use crate::context::{Item, ItemStream, OperationContext, ReleaseHook};
use crate::descriptor::OperationBody;
use crate::error::{NodeRuntimeError, OperatorError, PipelineError};
use crate::events::{EventSink, PipelineEvent};
use crate::extensions::OperatorExtensions;
use crate::fragment::{Fragment, FragmentKind, PipelinePlan};

/// Final result of a pipeline run: `Ok` or the first node failure
pub type PipelineOutcome = std::result::Result<(), NodeRuntimeError>;

/// An executable pipeline, ready to activate once
pub struct CompiledPipeline {
    id: String,
    plan: PipelinePlan,
    config: CompilerConfig,
    extensions: Arc<OperatorExtensions>,
    events: Arc<dyn EventSink>,
}

impl CompiledPipeline {
    pub(crate) fn new(
        plan: PipelinePlan,
        config: CompilerConfig,
        extensions: Arc<OperatorExtensions>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            plan,
            config,
            extensions,
            events,
        }
    }

    /// Unique id of this pipeline instance
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id of the graph this pipeline was compiled from
    pub fn graph_id(&self) -> &str {
        &self.plan.graph_id
    }

    /// Number of nodes, sub-graph contents included
    pub fn node_count(&self) -> usize {
        self.plan.node_count()
    }

    /// Deterministic rendering of the compiled plan
    ///
    /// Compiling an unchanged graph twice yields identical descriptions.
    pub fn describe(&self) -> String {
        self.plan.describe()
    }

    /// Replace the runtime objects handed to operators
    pub fn with_extensions(mut self, extensions: OperatorExtensions) -> Self {
        self.extensions = Arc::new(extensions);
        self
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Instantiate every node and start the sources
    ///
    /// Must be called from within a tokio runtime. A node that fails while
    /// being built fails the pipeline like a runtime failure would; the
    /// returned handle then resolves to that failure.
    pub fn activate(self) -> Result<RunningPipeline, PipelineError> {
        let handle = Handle::try_current().map_err(|_| PipelineError::NoRuntime)?;

        let pipeline_id: Arc<str> = Arc::from(self.id.as_str());
        let stop = CancellationToken::new();
        let abort = CancellationToken::new();
        let failure = FailureSlot::new(
            pipeline_id.clone(),
            stop.clone(),
            abort.clone(),
            self.events.clone(),
        );

        let mut activation = Activation {
            pipeline_id: pipeline_id.clone(),
            stop: stop.clone(),
            abort: abort.clone(),
            failure: failure.clone(),
            events: self.events.clone(),
            extensions: self.extensions.clone(),
            backlog_warning: self.config.backlog_warning(),
            tasks: JoinSet::new(),
            releases: Vec::new(),
        };

        log::info!(
            "Activating pipeline {} for graph '{}' ({} nodes)",
            pipeline_id,
            self.plan.graph_id,
            self.plan.node_count()
        );
        if activation.instantiate(&self.plan, Vec::new()).is_ok() {
            let _ = self.events.send(PipelineEvent::PipelineActivated {
                pipeline_id: pipeline_id.to_string(),
                nodes: self.plan.node_count(),
            });
        }

        let Activation { tasks, releases, .. } = activation;
        let (outcome_tx, outcome_rx) = watch::channel(None);
        handle.spawn(supervise(
            tasks,
            releases,
            failure,
            self.events,
            pipeline_id,
            outcome_tx,
        ));

        Ok(RunningPipeline {
            id: self.id,
            stop,
            abort,
            outcome: outcome_rx,
        })
    }
}

impl std::fmt::Debug for CompiledPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledPipeline")
            .field("id", &self.id)
            .field("graph_id", &self.plan.graph_id)
            .field("nodes", &self.plan.node_count())
            .finish()
    }
}

/// Handle to an active pipeline
///
/// Dropping the handle stops the sources; teardown still runs to
/// completion in the background.
pub struct RunningPipeline {
    id: String,
    stop: CancellationToken,
    abort: CancellationToken,
    outcome: watch::Receiver<Option<PipelineOutcome>>,
}

impl RunningPipeline {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether teardown has finished and the outcome is available
    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Stop every source without waiting; in-flight items still drain
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Hard stop: hubs and terminal subscriptions end without draining
    ///
    /// Aborting is not a failure; the outcome stays `Ok` unless a node had
    /// already failed.
    pub fn abort(&self) {
        log::info!("Aborting pipeline {}", self.id);
        self.stop.cancel();
        self.abort.cancel();
    }

    /// Wait for the pipeline to finish on its own
    pub async fn wait(&self) -> PipelineOutcome {
        wait_outcome(self.outcome.clone(), self.id.clone()).await
    }

    /// A detached future resolving to the outcome
    pub fn completion(&self) -> impl Future<Output = PipelineOutcome> + Send + 'static {
        wait_outcome(self.outcome.clone(), self.id.clone())
    }

    /// Stop the sources, drain in-flight items and release every node
    pub async fn deactivate(self) -> PipelineOutcome {
        log::info!("Deactivating pipeline {}", self.id);
        self.stop.cancel();
        self.wait().await
    }
}

impl Drop for RunningPipeline {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

async fn wait_outcome(
    mut outcome: watch::Receiver<Option<PipelineOutcome>>,
    pipeline_id: String,
) -> PipelineOutcome {
    let published = match outcome.wait_for(Option::is_some).await {
        Ok(value) => value.clone(),
        Err(_) => None,
    };
    published.unwrap_or_else(|| {
        Err(NodeRuntimeError::new(
            pipeline_id,
            "pipeline supervisor stopped before publishing an outcome",
        ))
    })
}

/// Sending half of one hub output
///
/// Never blocks: a branch that stops reading (a zip waiting on its other
/// side, say) must not starve its siblings.
enum Outlet {
    Forward(Branch),
    Back(mpsc::UnboundedSender<Item>),
}

/// Forward hub output that tracks how far its consumer lags behind
struct Branch {
    consumer: String,
    tx: mpsc::UnboundedSender<Item>,
    queued: Arc<AtomicUsize>,
    lagging: bool,
}

impl Branch {
    fn open(consumer: &str) -> (Self, ItemStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));
        let drained = queued.clone();
        let stream = UnboundedReceiverStream::new(rx)
            .map(move |item| {
                drained.fetch_sub(1, Ordering::Relaxed);
                Ok::<Item, OperatorError>(item)
            })
            .boxed();
        let branch = Self {
            consumer: consumer.to_string(),
            tx,
            queued,
            lagging: false,
        };
        (branch, stream)
    }
}

impl Outlet {
    /// Returns `false` once the consumer is gone
    fn send(&mut self, item: Item, backlog_warning: usize) -> bool {
        match self {
            Outlet::Back(tx) => tx.send(item).is_ok(),
            Outlet::Forward(branch) => {
                let queued = branch.queued.fetch_add(1, Ordering::Relaxed) + 1;
                if branch.tx.send(item).is_err() {
                    return false;
                }
                if queued > backlog_warning && !branch.lagging {
                    branch.lagging = true;
                    log::warn!(
                        "Fan-out into '{}' has {} unread items queued",
                        branch.consumer,
                        queued
                    );
                } else if queued <= backlog_warning / 2 {
                    branch.lagging = false;
                }
                true
            }
        }
    }
}

/// State threaded through instantiation of one pipeline
struct Activation {
    pipeline_id: Arc<str>,
    stop: CancellationToken,
    abort: CancellationToken,
    failure: FailureSlot,
    events: Arc<dyn EventSink>,
    extensions: Arc<OperatorExtensions>,
    backlog_warning: usize,
    tasks: JoinSet<()>,
    releases: Vec<(String, ReleaseHook)>,
}

impl Activation {
    /// Build every step of `plan`, returning the `Output` step's stream
    ///
    /// `external` feeds the plan's `Input` placeholders. Stops at the first
    /// node that fails to build; the failure is already recorded.
    fn instantiate(
        &mut self,
        plan: &PipelinePlan,
        external: Vec<ItemStream>,
    ) -> Result<Option<ItemStream>, ()> {
        let mut external: Vec<Option<ItemStream>> = external.into_iter().map(Some).collect();
        let mut slots: Vec<Vec<Option<ItemStream>>> = plan
            .steps
            .iter()
            .map(|f| f.inputs.iter().map(|_| None).collect())
            .collect();

        // Back edges point upstream, so their channels exist before either end
        let mut back_outlets: Vec<Vec<mpsc::UnboundedSender<Item>>> = vec![Vec::new(); plan.steps.len()];
        for (step, consumers) in plan.consumers.iter().enumerate() {
            for consumer in consumers.iter().filter(|c| c.back) {
                let (tx, rx) = mpsc::unbounded_channel();
                slots[consumer.step][consumer.slot] =
                    Some(UnboundedReceiverStream::new(rx).map(Ok::<Item, OperatorError>).boxed());
                back_outlets[step].push(tx);
            }
        }

        let mut output = None;
        for (step, fragment) in plan.steps.iter().enumerate() {
            let inputs: Option<Vec<ItemStream>> = slots[step].iter_mut().map(Option::take).collect();
            let built = match inputs {
                Some(inputs) => {
                    let inputs = if fragment.has_back_inputs() {
                        gate_feedback(inputs, fragment.inputs.iter().map(|i| i.back))
                    } else {
                        inputs
                    };
                    self.build_step(fragment, inputs, &mut external)
                }
                None => Err(OperatorError::new("an input stream was not wired")),
            };

            let stream = match built {
                Ok(stream) => stream,
                Err(error) => {
                    self.failure
                        .report(NodeRuntimeError::from_operator(fragment.path.as_str(), error));
                    return Err(());
                }
            };

            log::debug!("Pipeline {}: activated node '{}'", self.pipeline_id, fragment.path);
            let _ = self.events.send(PipelineEvent::NodeActivated {
                pipeline_id: self.pipeline_id.to_string(),
                node_id: fragment.path.clone(),
            });

            let stream = match fragment.kind {
                FragmentKind::Operation { .. } | FragmentKind::Script { .. } => {
                    ErrorBoundary::new(stream, Arc::from(fragment.path.as_str()), self.failure.clone())
                        .boxed()
                }
                // Already bounded by the nodes that produced them
                _ => stream,
            };

            if plan.output == Some(step) {
                output = Some(stream);
                continue;
            }

            let consumers = &plan.consumers[step];
            match consumers.as_slice() {
                [] => self.spawn_terminal(stream),
                [only] if !only.back => slots[only.step][only.slot] = Some(stream),
                _ => {
                    let mut back = std::mem::take(&mut back_outlets[step]).into_iter();
                    let mut outlets = Vec::with_capacity(consumers.len());
                    for consumer in consumers {
                        if consumer.back {
                            if let Some(tx) = back.next() {
                                outlets.push(Outlet::Back(tx));
                            }
                        } else {
                            let (branch, stream) = Branch::open(&plan.steps[consumer.step].path);
                            slots[consumer.step][consumer.slot] = Some(stream);
                            outlets.push(Outlet::Forward(branch));
                        }
                    }
                    self.spawn_hub(stream, outlets);
                }
            }
        }

        Ok(output)
    }

    fn build_step(
        &mut self,
        fragment: &Fragment,
        mut inputs: Vec<ItemStream>,
        external: &mut [Option<ItemStream>],
    ) -> Result<ItemStream, OperatorError> {
        let single = |inputs: &mut Vec<ItemStream>| match (inputs.pop(), inputs.is_empty()) {
            (Some(input), true) => Ok(input),
            _ => Err(OperatorError::new("expected exactly one input stream")),
        };

        match &fragment.kind {
            FragmentKind::Operation { operation, .. } => {
                let mut ctx = OperationContext::new(
                    &fragment.path,
                    &fragment.config,
                    &self.extensions,
                    &self.stop,
                    &mut self.releases,
                );
                let built = catch_unwind(AssertUnwindSafe(|| match &operation.body {
                    OperationBody::Source(build) => build(&mut ctx),
                    OperationBody::Transform(apply) => apply(single(&mut inputs)?, &mut ctx),
                    OperationBody::Combinator(combine) => combine(std::mem::take(&mut inputs), &mut ctx),
                }))
                .unwrap_or_else(|payload| Err(OperatorError::new(panic_message(payload.as_ref()))))?;

                if fragment.is_source() {
                    Ok(built.take_until(self.stop.clone().cancelled_owned()).boxed())
                } else {
                    Ok(built)
                }
            }
            FragmentKind::Script { script, .. } => Ok(script.clone().apply(single(&mut inputs)?)),
            FragmentKind::Subgraph(nested) => self
                .instantiate(nested, inputs)
                .map_err(|()| OperatorError::new("sub-graph failed to activate"))?
                .ok_or_else(|| OperatorError::new("sub-graph has no output")),
            FragmentKind::Input(position) => external
                .get_mut(*position)
                .and_then(Option::take)
                .ok_or_else(|| OperatorError::new(format!("no external input at position {}", position))),
            FragmentKind::Output => single(&mut inputs),
        }
    }

    /// Drive a node nobody consumes until it ends or the pipeline aborts
    fn spawn_terminal(&mut self, stream: ItemStream) {
        let abort = self.abort.clone();
        self.tasks.spawn(async move {
            tokio::select! {
                biased;
                _ = abort.cancelled() => {}
                _ = stream.for_each(|_| future::ready(())) => {}
            }
        });
    }

    /// Fan one stream out to several consumers
    fn spawn_hub(&mut self, mut stream: ItemStream, mut outlets: Vec<Outlet>) {
        let abort = self.abort.clone();
        let backlog_warning = self.backlog_warning;
        self.tasks.spawn(async move {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = abort.cancelled() => break,
                    next = stream.next() => next,
                };
                let Some(Ok(item)) = next else {
                    break;
                };

                outlets.retain_mut(|outlet| outlet.send(item.clone(), backlog_warning));
                if outlets.is_empty() {
                    break;
                }
            }
        });
    }
}

/// Close a feedback node's back inputs once all its forward inputs end
fn gate_feedback(inputs: Vec<ItemStream>, back: impl Iterator<Item = bool>) -> Vec<ItemStream> {
    let flags: Vec<bool> = back.collect();
    let forward_done = CancellationToken::new();
    let remaining = Arc::new(AtomicUsize::new(flags.iter().filter(|b| !**b).count()));

    inputs
        .into_iter()
        .zip(flags)
        .map(|(input, back)| {
            if back {
                return input.take_until(forward_done.clone().cancelled_owned()).boxed();
            }
            let remaining = remaining.clone();
            let done = forward_done.clone();
            let mut fired = false;
            input
                .chain(stream::poll_fn(move |_| {
                    if !fired {
                        fired = true;
                        if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                            done.cancel();
                        }
                    }
                    Poll::Ready(None)
                }))
                .boxed()
        })
        .collect()
}

async fn supervise(
    mut tasks: JoinSet<()>,
    releases: Vec<(String, ReleaseHook)>,
    failure: FailureSlot,
    events: Arc<dyn EventSink>,
    pipeline_id: Arc<str>,
    outcome: watch::Sender<Option<PipelineOutcome>>,
) {
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            log::error!("Pipeline {}: task ended abnormally: {}", pipeline_id, e);
        }
    }

    for (node_id, hook) in releases.into_iter().rev() {
        if let Err(e) = tokio::task::spawn_blocking(hook).await {
            log::error!(
                "Pipeline {}: release hook of node '{}' failed: {}",
                pipeline_id,
                node_id,
                e
            );
        }
        log::debug!("Pipeline {}: released node '{}'", pipeline_id, node_id);
        let _ = events.send(PipelineEvent::NodeReleased {
            pipeline_id: pipeline_id.to_string(),
            node_id,
        });
    }

    let result = match failure.get() {
        Some(error) => {
            let _ = events.send(PipelineEvent::PipelineFailed {
                pipeline_id: pipeline_id.to_string(),
                node_id: error.originating_node_id.clone(),
                error: error.inner_message.clone(),
            });
            log::warn!("Pipeline {} failed: {}", pipeline_id, error);
            Err(error)
        }
        None => {
            let _ = events.send(PipelineEvent::PipelineCompleted {
                pipeline_id: pipeline_id.to_string(),
            });
            log::info!("Pipeline {} completed", pipeline_id);
            Ok(())
        }
    };
    outcome.send_replace(Some(result));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::VecEventSink;
    use crate::graph::Graph;
    use crate::orchestrator::PipelineBuilder;
    use crate::test_support::{
        init_logging, test_registry, Collected, ReleaseLog, COLLECTOR, RELEASES, RELEASE_LOG,
    };
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::time::Duration;

    struct Harness {
        collected: Collected,
        releases: Arc<AtomicUsize>,
        release_log: ReleaseLog,
        events: Arc<VecEventSink>,
    }

    impl Harness {
        fn new() -> Self {
            init_logging();
            Self {
                collected: Arc::new(Mutex::new(Vec::new())),
                releases: Arc::new(AtomicUsize::new(0)),
                release_log: Arc::new(Mutex::new(Vec::new())),
                events: Arc::new(VecEventSink::new()),
            }
        }

        fn extensions(&self) -> OperatorExtensions {
            OperatorExtensions::new()
                .with(COLLECTOR, self.collected.clone())
                .with(RELEASES, self.releases.clone())
                .with(RELEASE_LOG, self.release_log.clone())
        }

        fn compile(&self, graph: &Graph) -> CompiledPipeline {
            PipelineBuilder::new(test_registry())
                .with_extensions(self.extensions())
                .with_event_sink(self.events.clone())
                .compile(graph)
                .unwrap()
        }

        async fn run(&self, graph: &Graph) -> PipelineOutcome {
            let running = self.compile(graph).activate().unwrap();
            tokio::time::timeout(Duration::from_secs(5), running.wait())
                .await
                .expect("pipeline did not finish")
        }

        fn collected(&self) -> Vec<Value> {
            self.collected.lock().clone()
        }

        fn sorted(&self) -> Vec<i64> {
            let mut values: Vec<i64> = self.collected().iter().filter_map(Value::as_i64).collect();
            values.sort_unstable();
            values
        }
    }

    fn linear(source: &str, transform: &str) -> Graph {
        let mut graph = Graph::new("g", "G");
        graph.add_operator("src", source);
        graph.add_operator("t", transform);
        graph.add_operator("sink", "collect");
        graph.connect("src", "t");
        graph.connect("t", "sink");
        graph
    }

    #[tokio::test]
    async fn test_source_double_collect() {
        let harness = Harness::new();
        let outcome = harness.run(&linear("numbers", "double")).await;
        assert!(outcome.is_ok());
        assert_eq!(harness.collected(), vec![json!(2), json!(4), json!(6)]);
    }

    #[tokio::test]
    async fn test_matches_manual_composition() {
        let values: Vec<i64> = (1..=20).collect();
        let mut graph = linear("numbers", "expression");
        graph.set_config("src", "values", json!(values));
        graph.set_config("t", "expression", json!("it * it + 1"));
        graph.add_operator("keep", "condition").config.set("expression", json!("it % 2 == 0"));
        graph.edges.retain(|e| e.to_node != "sink");
        graph.connect("t", "keep");
        graph.connect("keep", "sink");

        let harness = Harness::new();
        harness.run(&graph).await.unwrap();

        let expected: Vec<Value> = values
            .iter()
            .map(|n| n * n + 1)
            .filter(|n| n % 2 == 0)
            .map(|n| json!(n))
            .collect();
        assert_eq!(harness.collected(), expected);
    }

    #[tokio::test]
    async fn test_fan_out_with_low_backlog_warning() {
        let mut graph = Graph::new("g", "G");
        graph.add_operator("src", "numbers").config.set("values", json!((1..=50).collect::<Vec<_>>()));
        graph.add_operator("a", "double");
        graph.add_operator("b", "expression").config.set("expression", json!("it + 1000"));
        graph.add_operator("m", "merge");
        graph.add_operator("sink", "collect");
        graph.connect("src", "a");
        graph.connect("src", "b");
        graph.connect("a", "m");
        graph.connect("b", "m");
        graph.connect("m", "sink");

        let harness = Harness::new();
        let mut config = CompilerConfig::default();
        config.pipeline.backlog_warning = 1;
        let running = PipelineBuilder::new(test_registry())
            .with_config(config)
            .with_extensions(harness.extensions())
            .compile(&graph)
            .unwrap()
            .activate()
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), running.wait())
            .await
            .unwrap()
            .unwrap();

        let mut expected: Vec<i64> = (1..=50).map(|n| n * 2).chain((1..=50).map(|n| n + 1000)).collect();
        expected.sort_unstable();
        assert_eq!(harness.sorted(), expected);
    }

    #[tokio::test]
    async fn test_fan_out_rejoined_by_zip_behind_filter() {
        // The unfiltered branch runs far ahead while zip waits on the other
        let mut graph = Graph::new("g", "G");
        graph.add_operator("src", "numbers").config.set("values", json!((0..200).collect::<Vec<_>>()));
        graph.add_operator("all", "expression").config.set("expression", json!("it"));
        graph.add_operator("big", "condition").config.set("expression", json!("it > 100"));
        graph.add_operator("pair", "pair");
        graph.add_operator("sink", "collect");
        graph.connect("src", "all");
        graph.connect("src", "big");
        graph.connect_port("all", "pair", 0);
        graph.connect_port("big", "pair", 1);
        graph.connect("pair", "sink");

        let harness = Harness::new();
        let mut config = CompilerConfig::default();
        config.pipeline.backlog_warning = 8;
        let running = PipelineBuilder::new(test_registry())
            .with_config(config)
            .with_extensions(harness.extensions())
            .compile(&graph)
            .unwrap()
            .activate()
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), running.wait())
            .await
            .expect("fan-out into zip stalled")
            .unwrap();

        let expected: Vec<Value> = (0..99).map(|n| json!([n, n + 101])).collect();
        assert_eq!(harness.collected(), expected);
    }

    #[tokio::test]
    async fn test_zip_preserves_positions() {
        let mut graph = Graph::new("g", "G");
        graph.add_operator("n", "numbers");
        graph.add_operator("w", "words");
        graph.add_operator("pair", "pair");
        graph.add_operator("sink", "collect");
        graph.connect_port("n", "pair", 0);
        graph.connect_port("w", "pair", 1);
        graph.connect("pair", "sink");

        let harness = Harness::new();
        harness.run(&graph).await.unwrap();
        assert_eq!(harness.collected(), vec![json!([1, "a"]), json!([2, "b"])]);
    }

    #[tokio::test]
    async fn test_subgraph_runs_inline() {
        let mut inner = Graph::new("inner", "Inner");
        inner.add_input("in", 0);
        inner.add_operator("d", "double");
        inner.add_operator("again", "double");
        inner.add_output("out");
        inner.connect("in", "d");
        inner.connect("d", "again");
        inner.connect("again", "out");

        let mut graph = Graph::new("g", "G");
        graph.add_operator("src", "numbers");
        graph.add_subgraph("quad", inner);
        graph.add_operator("sink", "collect");
        graph.connect("src", "quad");
        graph.connect("quad", "sink");

        let harness = Harness::new();
        harness.run(&graph).await.unwrap();
        assert_eq!(harness.collected(), vec![json!(4), json!(8), json!(12)]);
    }

    #[tokio::test]
    async fn test_feedback_loop_terminates() {
        let mut graph = Graph::new("g", "G");
        graph.add_operator("src", "numbers").config.set("values", json!([1]));
        graph.add_operator("m", "merge").feedback = true;
        graph.add_operator("small", "condition").config.set("expression", json!("it < 32"));
        graph.add_operator("d", "double");
        graph.add_operator("sink", "collect");
        graph.connect("src", "m");
        graph.connect("m", "small");
        graph.connect("small", "d");
        graph.connect("d", "m");
        graph.connect("m", "sink");

        let harness = Harness::new();
        harness.run(&graph).await.unwrap();

        let seen = harness.sorted();
        assert_eq!(seen.first(), Some(&1));
        assert!(seen.iter().all(|n| [1, 2, 4, 8, 16, 32].contains(n)), "{:?}", seen);
    }

    #[tokio::test]
    async fn test_runtime_failure_is_attributed() {
        let mut graph = linear("numbers", "fail");
        graph.set_config("t", "value", json!(2));

        let harness = Harness::new();
        let error = harness.run(&graph).await.unwrap_err();
        assert_eq!(error.originating_node_id, "t");
        assert_eq!(error.inner_message, "refusing 2");
        // Nothing after the failing item reaches the sink
        assert_eq!(harness.collected(), vec![json!(1)]);
    }

    #[tokio::test]
    async fn test_panic_inside_subgraph_is_attributed() {
        let mut inner = Graph::new("inner", "Inner");
        inner.add_input("in", 0);
        inner.add_operator("boom", "explode").config.set("value", json!(3));
        inner.add_output("out");
        inner.connect("in", "boom");
        inner.connect("boom", "out");

        let mut graph = Graph::new("g", "G");
        graph.add_operator("src", "numbers");
        graph.add_subgraph("group", inner);
        graph.add_operator("sink", "collect");
        graph.connect("src", "group");
        graph.connect("group", "sink");

        let harness = Harness::new();
        let error = harness.run(&graph).await.unwrap_err();
        assert_eq!(error.originating_node_id, "group/boom");
        assert!(error.inner_message.contains("exploded on 3"));
        assert_eq!(harness.collected(), vec![json!(1), json!(2)]);
    }

    #[tokio::test]
    async fn test_release_hooks_run_once_on_completion() {
        let mut graph = Graph::new("g", "G");
        graph.add_operator("a", "tracked");
        graph.add_operator("b", "tracked");
        graph.add_operator("m", "merge");
        graph.add_operator("sink", "collect");
        graph.connect("a", "m");
        graph.connect("b", "m");
        graph.connect("m", "sink");

        let harness = Harness::new();
        harness.run(&graph).await.unwrap();
        assert_eq!(harness.releases.load(Ordering::SeqCst), 2);
        // Reverse activation order
        assert_eq!(*harness.release_log.lock(), vec!["b".to_string(), "a".to_string()]);
    }

    #[tokio::test]
    async fn test_release_hooks_run_once_on_failure() {
        let mut graph = linear("tracked", "fail");
        graph.set_config("t", "value", json!(1));

        let harness = Harness::new();
        assert!(harness.run(&graph).await.is_err());
        assert_eq!(harness.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deactivate_drains_and_releases() {
        let mut graph = Graph::new("g", "G");
        graph.add_operator("tick", "ticker");
        graph.add_operator("sink", "collect");
        graph.connect("tick", "sink");

        let harness = Harness::new();
        let running = harness.compile(&graph).activate().unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!running.is_finished());

        let outcome = tokio::time::timeout(Duration::from_secs(5), running.deactivate())
            .await
            .unwrap();
        assert!(outcome.is_ok());

        let ticks = harness.sorted();
        assert!(!ticks.is_empty());
        let expected: Vec<i64> = (0..ticks.len() as i64).collect();
        assert_eq!(ticks, expected);
        let released = harness
            .events
            .events()
            .iter()
            .filter(|e| matches!(e, PipelineEvent::NodeReleased { node_id, .. } if node_id == "tick"))
            .count();
        assert_eq!(released, 1);
    }

    #[tokio::test]
    async fn test_abort_stops_without_failure() {
        let mut graph = Graph::new("g", "G");
        graph.add_operator("tick", "ticker");
        graph.add_operator("sink", "collect");
        graph.connect("tick", "sink");

        let harness = Harness::new();
        let running = harness.compile(&graph).activate().unwrap();
        running.abort();
        let outcome = tokio::time::timeout(Duration::from_secs(5), running.wait())
            .await
            .unwrap();
        assert!(outcome.is_ok());
        assert!(running.is_finished());
    }

    #[tokio::test]
    async fn test_dropping_handle_still_tears_down() {
        let mut graph = linear("tracked", "double");
        graph.set_config("src", "values", json!([1, 2, 3]));

        let harness = Harness::new();
        let running = harness.compile(&graph).activate().unwrap();
        let done = running.completion();
        drop(running);
        assert!(tokio::time::timeout(Duration::from_secs(5), done).await.unwrap().is_ok());
        assert_eq!(harness.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_build_failure_fails_pipeline() {
        let mut graph = linear("tracked", "double");
        graph.set_config("sink", "collector", json!("missing"));

        let harness = Harness::new();
        let error = harness.run(&graph).await.unwrap_err();
        assert_eq!(error.originating_node_id, "sink");
        assert!(error.inner_message.contains("no collector 'missing'"));
        // Nodes built before the failure are still released
        assert_eq!(harness.releases.load(Ordering::SeqCst), 1);
        assert!(!harness
            .events
            .events()
            .iter()
            .any(|e| matches!(e, PipelineEvent::PipelineActivated { .. })));
    }

    #[tokio::test]
    async fn test_lifecycle_events() {
        let harness = Harness::new();
        let pipeline = harness.compile(&linear("numbers", "double"));
        let id = pipeline.id().to_string();
        pipeline.activate().unwrap().wait().await.unwrap();

        let events = harness.events.events();
        assert!(events.iter().all(|e| e.pipeline_id() == id));
        let activated: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::NodeActivated { node_id, .. } => Some(node_id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(activated, vec!["src", "t", "sink"]);
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::PipelineActivated { nodes: 3, .. })));
        assert!(matches!(events.last(), Some(PipelineEvent::PipelineCompleted { .. })));
    }

    #[tokio::test]
    async fn test_failure_events() {
        let mut graph = linear("numbers", "fail");
        graph.set_config("t", "value", json!(1));

        let harness = Harness::new();
        harness.run(&graph).await.unwrap_err();
        let events = harness.events.events();
        assert!(events
            .iter()
            .any(|e| matches!(e, PipelineEvent::NodeFailed { node_id, .. } if node_id == "t")));
        assert!(matches!(
            events.last(),
            Some(PipelineEvent::PipelineFailed { node_id, .. }) if node_id == "t"
        ));
    }

    #[test]
    fn test_activation_requires_runtime() {
        let harness = Harness::new();
        let pipeline = harness.compile(&linear("numbers", "double"));
        assert!(matches!(pipeline.activate(), Err(PipelineError::NoRuntime)));
    }
}
