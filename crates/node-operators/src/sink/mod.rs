//! Sink operators
//!
//! Observers at the end of a chain. Sinks pass every item through
//! unchanged so they can also sit in the middle of a graph.

mod collect;
mod log_items;

pub use collect::{CollectConfig, CollectOperator, Collector, DEFAULT_COLLECTOR};
pub use log_items::{LogConfig, LogOperator};
