//! Node Operators
//!
//! Built-in operator library for the node compiler.
//! Each operator is an atomic building block that can be composed into
//! graphs and is registered at link time through `inventory`.
//!
//! # Categories
//!
//! - **Source**: Operators that produce items (ranges, literals, timers)
//! - **Transform**: One input, one output (skip, take, scale, ...)
//! - **Combinator**: Operators joining several inputs (merge, zip, combine-latest)
//! - **Sink**: Observers at the end of a chain (log, collect)
//! - **Script**: Expression and condition nodes evaluated by the compiler

use node_compiler::{NodeConfig, OperatorError};
use serde::de::DeserializeOwned;

pub mod combinator;
pub mod script;
pub mod setup;
pub mod sink;
pub mod source;
pub mod transform;

#[cfg(test)]
mod testing;

// Re-export all operators for convenience
pub use combinator::*;
pub use script::*;
pub use setup::{builtin_registry, install_collector, setup_extensions};
pub use sink::*;
pub use source::*;
pub use transform::*;

/// Read a node's configuration into an operator config struct
pub(crate) fn read_config<T: DeserializeOwned>(
    config: &NodeConfig,
    operator: &str,
) -> Result<T, OperatorError> {
    config
        .decode()
        .map_err(|e| OperatorError::with_source(format!("invalid {} configuration", operator), e))
}
