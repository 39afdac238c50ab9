//! Lifecycle events for running pipelines
//!
//! Events are sent from a running pipeline to the host (or any consumer)
//! to report activation, node failures, teardown, and the final outcome.

use serde::{Deserialize, Serialize};

/// Trait for receiving pipeline events
///
/// Abstracts over the transport (channel, log, editor bridge) so the
/// runtime can be used in different hosts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be delivered (e.g., channel closed)
    fn send(&self, event: PipelineEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted while a pipeline runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PipelineEvent {
    /// All nodes were built and sources started
    #[serde(rename_all = "camelCase")]
    PipelineActivated { pipeline_id: String, nodes: usize },

    /// Every stream completed and teardown finished
    #[serde(rename_all = "camelCase")]
    PipelineCompleted { pipeline_id: String },

    /// A node failed; teardown has finished
    #[serde(rename_all = "camelCase")]
    PipelineFailed {
        pipeline_id: String,
        node_id: String,
        error: String,
    },

    /// A node's fragment was instantiated
    #[serde(rename_all = "camelCase")]
    NodeActivated { pipeline_id: String, node_id: String },

    /// A node raised a runtime failure
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        pipeline_id: String,
        node_id: String,
        error: String,
    },

    /// A node's release hook ran
    #[serde(rename_all = "camelCase")]
    NodeReleased { pipeline_id: String, node_id: String },
}

impl PipelineEvent {
    pub fn pipeline_id(&self) -> &str {
        match self {
            Self::PipelineActivated { pipeline_id, .. }
            | Self::PipelineCompleted { pipeline_id }
            | Self::PipelineFailed { pipeline_id, .. }
            | Self::NodeActivated { pipeline_id, .. }
            | Self::NodeFailed { pipeline_id, .. }
            | Self::NodeReleased { pipeline_id, .. } => pipeline_id,
        }
    }
}

/// A no-op event sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: PipelineEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
#[derive(Default)]
pub struct VecEventSink {
    events: parking_lot::Mutex<Vec<PipelineEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: PipelineEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Event sink backed by a tokio channel
pub struct ChannelEventSink {
    tx: tokio::sync::mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: tokio::sync::mpsc::UnboundedSender<PipelineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: PipelineEvent) -> Result<(), EventError> {
        self.tx.send(event).map_err(|_| EventError::channel_closed())
    }
}
