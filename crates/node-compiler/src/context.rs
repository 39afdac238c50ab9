//! Runtime-facing types handed to operator implementations
//!
//! Operators see their upstream as [`ItemStream`]s and receive an
//! [`OperationContext`] while their node is being activated. The context
//! exposes the node's configuration, host extensions, the cooperative stop
//! token, and lets the operator register release hooks that run once when
//! the pipeline is torn down.

use std::sync::Arc;

use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::OperatorError;
use crate::extensions::OperatorExtensions;
use crate::graph::NodeConfig;

/// A single item flowing along an edge
pub type Item = serde_json::Value;

/// The stream of items an operator consumes or produces
pub type ItemStream = BoxStream<'static, std::result::Result<Item, OperatorError>>;

/// Teardown closure registered by a node during activation
pub type ReleaseHook = Box<dyn FnOnce() + Send + 'static>;

/// Per-node view of the activation in progress
pub struct OperationContext<'a> {
    node_id: &'a str,
    config: &'a Arc<NodeConfig>,
    extensions: &'a OperatorExtensions,
    stop: &'a CancellationToken,
    releases: &'a mut Vec<(String, ReleaseHook)>,
}

impl<'a> OperationContext<'a> {
    pub(crate) fn new(
        node_id: &'a str,
        config: &'a Arc<NodeConfig>,
        extensions: &'a OperatorExtensions,
        stop: &'a CancellationToken,
        releases: &'a mut Vec<(String, ReleaseHook)>,
    ) -> Self {
        Self {
            node_id,
            config,
            extensions,
            stop,
            releases,
        }
    }

    /// Id (or sub-graph path) of the node being activated
    pub fn node_id(&self) -> &str {
        self.node_id
    }

    pub fn config(&self) -> &NodeConfig {
        self.config
    }

    /// The configuration as a shared handle, for moving into streams
    pub fn shared_config(&self) -> Arc<NodeConfig> {
        self.config.clone()
    }

    /// Host-provided runtime objects
    pub fn extensions(&self) -> &OperatorExtensions {
        self.extensions
    }

    /// Token cancelled when the pipeline stops its sources
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Register a hook that runs exactly once at teardown
    ///
    /// Hooks run in reverse activation order, after every in-flight item
    /// has drained.
    pub fn on_release(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.releases
            .push((self.node_id.to_string(), Box::new(hook)));
    }
}

/// Handle a thread-backed source uses to push items into the pipeline
pub struct Emitter {
    tx: mpsc::UnboundedSender<std::result::Result<Item, OperatorError>>,
    stop: CancellationToken,
}

impl Emitter {
    pub(crate) fn new(
        tx: mpsc::UnboundedSender<std::result::Result<Item, OperatorError>>,
        stop: CancellationToken,
    ) -> Self {
        Self { tx, stop }
    }

    /// Push an item downstream
    ///
    /// Returns `false` once the pipeline is stopping; the source should
    /// return at that point.
    pub fn emit(&self, item: Item) -> bool {
        if self.stop.is_cancelled() {
            return false;
        }
        self.tx.send(Ok(item)).is_ok()
    }

    /// Report a failure; the pipeline attributes it to this source's node
    pub fn fail(&self, error: OperatorError) {
        let _ = self.tx.send(Err(error));
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled() || self.tx.is_closed()
    }
}
