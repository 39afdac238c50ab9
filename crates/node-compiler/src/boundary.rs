//! Per-node error boundary
//!
//! Every node's output stream is wrapped in an [`ErrorBoundary`]. An `Err`
//! item or a panic raised while polling the node ends that node's stream
//! and is recorded, attributed to the node, in the pipeline's
//! [`FailureSlot`]. The first recorded failure wins and aborts the rest of
//! the pipeline.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use pin_project_lite::pin_project;
use tokio_util::sync::CancellationToken;

use crate::context::Item;
use crate::error::{NodeRuntimeError, OperatorError};
use crate::events::{EventSink, PipelineEvent};

/// Shared failure channel of one running pipeline
#[derive(Clone)]
pub(crate) struct FailureSlot {
    first: Arc<Mutex<Option<NodeRuntimeError>>>,
    stop: CancellationToken,
    abort: CancellationToken,
    events: Arc<dyn EventSink>,
    pipeline_id: Arc<str>,
}

impl FailureSlot {
    pub fn new(
        pipeline_id: Arc<str>,
        stop: CancellationToken,
        abort: CancellationToken,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            first: Arc::new(Mutex::new(None)),
            stop,
            abort,
            events,
            pipeline_id,
        }
    }

    /// Record a node failure and abort the pipeline
    ///
    /// Returns `false` when an earlier failure was already recorded; later
    /// failures are logged but do not replace it.
    pub fn report(&self, error: NodeRuntimeError) -> bool {
        let node_id = error.originating_node_id.clone();
        let message = error.inner_message.clone();
        let recorded = {
            let mut first = self.first.lock();
            if first.is_some() {
                false
            } else {
                *first = Some(error);
                true
            }
        };

        if recorded {
            log::error!(
                "Pipeline {}: node '{}' failed: {}",
                self.pipeline_id,
                node_id,
                message
            );
            let _ = self.events.send(PipelineEvent::NodeFailed {
                pipeline_id: self.pipeline_id.to_string(),
                node_id,
                error: message,
            });
            self.stop.cancel();
            self.abort.cancel();
        } else {
            log::debug!(
                "Pipeline {}: ignoring later failure of node '{}': {}",
                self.pipeline_id,
                node_id,
                message
            );
        }
        recorded
    }

    /// The first recorded failure, if any
    pub fn get(&self) -> Option<NodeRuntimeError> {
        self.first.lock().clone()
    }

    pub fn abort_token(&self) -> &CancellationToken {
        &self.abort
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

pin_project! {
    /// Stream adapter that turns node failures into pipeline failures
    pub(crate) struct ErrorBoundary<S> {
        #[pin]
        inner: S,
        node_id: Arc<str>,
        failure: FailureSlot,
        done: bool,
    }
}

impl<S> ErrorBoundary<S> {
    pub fn new(inner: S, node_id: Arc<str>, failure: FailureSlot) -> Self {
        Self {
            inner,
            node_id,
            failure,
            done: false,
        }
    }
}

impl<S> Stream for ErrorBoundary<S>
where
    S: Stream<Item = Result<Item, OperatorError>>,
{
    type Item = Result<Item, OperatorError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }
        if this.failure.abort_token().is_cancelled() {
            *this.done = true;
            return Poll::Ready(None);
        }

        let inner = this.inner;
        let error = match catch_unwind(AssertUnwindSafe(move || inner.poll_next(cx))) {
            Ok(Poll::Ready(Some(Ok(item)))) => return Poll::Ready(Some(Ok(item))),
            Ok(Poll::Ready(None)) => {
                *this.done = true;
                return Poll::Ready(None);
            }
            Ok(Poll::Pending) => return Poll::Pending,
            Ok(Poll::Ready(Some(Err(error)))) => NodeRuntimeError::from_operator(&**this.node_id, error),
            Err(payload) => NodeRuntimeError::new(&**this.node_id, panic_message(payload.as_ref())),
        };

        *this.done = true;
        this.failure.report(error);
        Poll::Ready(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::VecEventSink;
    use futures::{stream, StreamExt};
    use serde_json::json;

    fn slot(events: Arc<VecEventSink>) -> FailureSlot {
        FailureSlot::new(
            Arc::from("p"),
            CancellationToken::new(),
            CancellationToken::new(),
            events,
        )
    }

    #[tokio::test]
    async fn test_error_item_ends_stream() {
        let events = Arc::new(VecEventSink::new());
        let failure = slot(events.clone());
        let inner = stream::iter(vec![
            Ok(json!(1)),
            Err(OperatorError::new("bad item")),
            Ok(json!(3)),
        ]);
        let seen: Vec<Item> = ErrorBoundary::new(inner, Arc::from("double"), failure.clone())
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(seen, vec![json!(1)]);
        let error = failure.get().unwrap();
        assert_eq!(error.originating_node_id, "double");
        assert_eq!(error.inner_message, "bad item");
        assert!(failure.abort_token().is_cancelled());
        assert!(matches!(
            events.events().as_slice(),
            [PipelineEvent::NodeFailed { node_id, .. }] if node_id == "double"
        ));
    }

    #[tokio::test]
    async fn test_panic_is_attributed() {
        let failure = slot(Arc::new(VecEventSink::new()));
        let inner = stream::iter(1..=3).map(|n| {
            if n == 2 {
                panic!("two is not allowed");
            }
            Ok::<_, OperatorError>(json!(n))
        });
        let count = ErrorBoundary::new(inner, Arc::from("group/explode"), failure.clone())
            .count()
            .await;

        assert_eq!(count, 1);
        let error = failure.get().unwrap();
        assert_eq!(error.originating_node_id, "group/explode");
        assert!(error.inner_message.contains("two is not allowed"));
    }

    #[test]
    fn test_first_failure_wins() {
        let failure = slot(Arc::new(VecEventSink::new()));
        assert!(failure.report(NodeRuntimeError::new("a", "first")));
        assert!(!failure.report(NodeRuntimeError::new("b", "second")));
        assert_eq!(failure.get().unwrap().originating_node_id, "a");
    }

    #[tokio::test]
    async fn test_abort_ends_healthy_stream() {
        let failure = slot(Arc::new(VecEventSink::new()));
        failure.abort_token().cancel();
        let healthy = stream::repeat_with(|| Ok::<_, OperatorError>(json!(0)));
        let count = ErrorBoundary::new(healthy, Arc::from("src"), failure.clone())
            .count()
            .await;
        assert_eq!(count, 0);
        assert!(failure.get().is_none());
    }

    #[test]
    fn test_pending_stream_ends_on_abort() {
        let failure = slot(Arc::new(VecEventSink::new()));
        let mut boundary = tokio_test::task::spawn(ErrorBoundary::new(
            stream::pending::<Result<Item, OperatorError>>(),
            Arc::from("src"),
            failure.clone(),
        ));
        tokio_test::assert_pending!(boundary.poll_next());

        failure.abort_token().cancel();
        assert!(tokio_test::assert_ready!(boundary.poll_next()).is_none());
        assert!(failure.get().is_none());
    }
}
