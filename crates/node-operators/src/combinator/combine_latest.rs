//! Combine-Latest Operator
//!
//! Pairs the most recent item of each input whenever either side emits.

use futures::future;
use futures::stream::{self, StreamExt};
use node_compiler::{
    Item, ItemStream, Operation, OperatorDefinition, OperatorDescriptor, OperatorError,
    OperatorRole,
};
use serde_json::json;

use super::{pair_signature, two_inputs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

enum Event {
    Item(Side, Result<Item, OperatorError>),
    Done(Side),
}

/// Latest item seen on each side
#[derive(Debug, Default)]
struct LatestPair {
    left: Option<Item>,
    right: Option<Item>,
}

impl LatestPair {
    /// Record an item; returns the pair to emit once both sides have one
    fn update(&mut self, side: Side, item: Item) -> Option<Item> {
        match side {
            Side::Left => self.left = Some(item),
            Side::Right => self.right = Some(item),
        }
        match (&self.left, &self.right) {
            (Some(l), Some(r)) => Some(json!([l, r])),
            _ => None,
        }
    }

    /// A side that completes without ever emitting ends the output
    fn starved(&self, side: Side) -> bool {
        match side {
            Side::Left => self.left.is_none(),
            Side::Right => self.right.is_none(),
        }
    }
}

fn tagged(input: ItemStream, side: Side) -> stream::BoxStream<'static, Event> {
    input
        .map(move |item| Event::Item(side, item))
        .chain(stream::once(future::ready(Event::Done(side))))
        .boxed()
}

/// Combine-Latest Operator
///
/// `(T, U) -> (T, U)`. Nothing is emitted until both inputs have produced
/// an item; afterwards every item on either side emits the pair of latest
/// values. Completes when both inputs have completed, or as soon as one
/// completes having emitted nothing.
pub struct CombineLatestOperator;

impl CombineLatestOperator {
    pub const ID: &'static str = "combine-latest";
}

impl OperatorDefinition for CombineLatestOperator {
    fn descriptor() -> OperatorDescriptor {
        OperatorDescriptor::new(Self::ID, OperatorRole::Combinator)
            .with_label("Combine Latest")
            .with_description("Emits the latest pair whenever either input emits")
            .with_ports(2)
            .with_operation(Operation::combinator(
                "combine-latest",
                pair_signature(),
                |inputs, _| {
                    let (left, right) = two_inputs(inputs)?;
                    let events = stream::select(tagged(left, Side::Left), tagged(right, Side::Right));
                    Ok(events
                        .scan(LatestPair::default(), |latest, event| {
                            let step = match event {
                                Event::Item(_, Err(e)) => Some(Some(Err(e))),
                                Event::Item(side, Ok(item)) => Some(latest.update(side, item).map(Ok)),
                                Event::Done(side) if latest.starved(side) => None,
                                Event::Done(_) => Some(None),
                            };
                            future::ready(step)
                        })
                        .filter_map(future::ready)
                        .boxed())
                },
            ))
    }
}

inventory::submit!(node_compiler::OperatorFn(CombineLatestOperator::descriptor));
